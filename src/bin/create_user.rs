use anyhow::{anyhow, Result};
use std::env;
use survey_tool::auth::hash_password;
use survey_tool::database::Database;
use survey_tool::models::User;
use uuid::Uuid;

#[derive(Debug, Default, PartialEq)]
struct UserArgs {
    username: String,
    password: String,
    superuser: bool,
    view_answers: bool,
    view_submissions: bool,
}

fn usage() -> String {
    "usage: create_user <username> <password> [--superuser] [--view-answers] [--view-submissions]"
        .to_string()
}

fn parse_args(args: &[String]) -> Result<UserArgs> {
    let mut parsed = UserArgs::default();
    let mut positional = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--superuser" => parsed.superuser = true,
            "--view-answers" => parsed.view_answers = true,
            "--view-submissions" => parsed.view_submissions = true,
            flag if flag.starts_with("--") => return Err(anyhow!("unknown flag '{}'\n{}", flag, usage())),
            value => positional.push(value.to_string()),
        }
    }

    match positional.as_slice() {
        [username, password] => {
            parsed.username = username.clone();
            parsed.password = password.clone();
            Ok(parsed)
        }
        _ => Err(anyhow!(usage())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:survey.db".to_string());
    println!("Connecting to database: {}", database_url);
    let db = Database::new(&database_url).await?;

    let password_hash = hash_password(&args.password)?;

    match db.get_user_by_username(&args.username).await? {
        Some(mut user) => {
            user.password_hash = password_hash;
            user.is_superuser = args.superuser;
            user.can_view_answers = args.view_answers;
            user.can_view_submissions = args.view_submissions;
            user.token = None;
            db.update_user(&user).await?;
            println!("✓ Updated user '{}'", user.username);
        }
        None => {
            let user = User {
                id: Uuid::new_v4(),
                username: args.username,
                password_hash,
                is_superuser: args.superuser,
                can_view_answers: args.view_answers,
                can_view_submissions: args.view_submissions,
                token: None,
            };
            db.insert_user(&user).await?;
            println!("✓ Created user '{}' ({})", user.username, user.id);
        }
    }

    Ok(())
}
