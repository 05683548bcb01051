//! User command handlers.

use tabled::Tabled;

use fleetdesk_core::{DirectoryFleet, User};

use crate::cli::{GlobalOpts, UsersArgs, UsersCommand};
use crate::error::CliError;
use crate::output::{self, or_dash};

use super::util;

#[derive(Tabled)]
pub(super) struct UserRow {
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Student ID")]
    student_id: String,
    #[tabled(rename = "Org Unit")]
    org_unit: String,
    #[tabled(rename = "Suspended")]
    suspended: String,
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        Self {
            email: u.primary_email.clone(),
            name: u.full_name.clone(),
            student_id: or_dash(u.student_id.as_deref()),
            org_unit: u.org_unit_path.clone(),
            suspended: if u.suspended { "yes".into() } else { String::new() },
        }
    }
}

fn detail(u: &User) -> String {
    let mut lines = vec![
        format!("Email:      {}", u.primary_email),
        format!("Name:       {}", u.full_name),
        format!("ID:         {}", u.external_id),
        format!("Student ID: {}", or_dash(u.student_id.as_deref())),
        format!("Org Unit:   {}", u.org_unit_path),
        format!("Suspended:  {}", u.suspended),
        format!("Admin:      {}", u.is_admin),
    ];
    if let Some(login) = u.last_login_at {
        lines.push(format!("Last Login: {}", login.format("%Y-%m-%d %H:%M")));
    }
    lines.join("\n")
}

pub async fn handle(
    args: UsersArgs,
    fleet: &DirectoryFleet,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let user = match args.command {
        UsersCommand::List(list) => {
            let filter = util::list_filter(&list)?;
            let users = util::apply_limit(fleet.users(&filter), list.limit);
            if users.is_empty() && fleet.store().users().is_empty() && !global.quiet {
                eprintln!("No users cached yet. Run: fleetdesk sync users");
            }
            let out = output::render_list(
                global.output,
                &users,
                |u| UserRow::from(&**u),
                |u| u.primary_email.clone(),
            )?;
            output::print_output(&out, global.quiet);
            return Ok(());
        }
        UsersCommand::Suspend { user, reason } => fleet.suspend_user(&user, reason).await?,
        UsersCommand::Unsuspend { user } => fleet.unsuspend_user(&user).await?,
        UsersCommand::Move { user, to } => fleet.move_user(&user, &to).await?,
    };

    let out = output::render_single(global.output, user.as_ref(), detail, |u| {
        u.primary_email.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
