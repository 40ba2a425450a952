use crate::cli::UserCommands;
use crate::context::AppContext;
use crate::error::Result;
use crate::users::UserManager;

use super::utils::print_json;

/// Handle all `tasklens user` subcommands
pub async fn handle_user_command(ctx: &AppContext, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add {
            email,
            name,
            format,
        } => {
            let user = UserManager::new(&ctx.pool)
                .add_user(&email, name.as_deref())
                .await?;

            if format == "json" {
                print_json(&user)?;
            } else {
                println!("Created user #{} <{}>", user.id, user.email);
            }
            Ok(())
        },
    }
}
