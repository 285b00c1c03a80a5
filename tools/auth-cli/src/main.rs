use clap::{Parser, Subcommand};

use maqraa_auth::{AuthClient, ProfilePatch, SignUpRequest, StudentProfilePatch, TeacherProfilePatch};
use maqraa_common::{ProviderConfig, UserRole};

#[derive(Parser)]
#[command(name = "auth-cli")]
#[command(about = "Maqraa Auth Smoke-Test CLI Tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the selected backend and provider reachability
    Status,
    /// Create an account and print the resulting session
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// student or teacher
        #[arg(long, default_value = "student")]
        role: UserRole,
        #[arg(long)]
        name: String,
    },
    /// Sign in and print the resulting session
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in, rename the profile, and print the updated session
    Rename {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = ProviderConfig::from_env();
    let client = AuthClient::from_config(&config)?;

    match cli.command {
        Commands::Status => {
            match &config.url {
                Some(url) => println!("Backend: hosted provider ({url})"),
                None => println!("Backend: local mock (provider unconfigured)"),
            }
            if client.test_connection().await {
                println!("✅ Provider reachable");
            } else {
                println!("⚠️  Provider unreachable");
            }
        }
        Commands::SignUp {
            email,
            password,
            role,
            name,
        } => {
            let session = client
                .sign_up(SignUpRequest {
                    email,
                    password,
                    role,
                    name,
                })
                .await?;
            println!("✅ Signed up");
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::SignIn { email, password } => {
            let session = client.sign_in(&email, &password).await?;
            println!("✅ Signed in");
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::Rename {
            email,
            password,
            name,
        } => {
            let session = client.sign_in(&email, &password).await?;
            let patch = match session.role {
                UserRole::Student => ProfilePatch::Student(StudentProfilePatch {
                    name: Some(name),
                    ..Default::default()
                }),
                UserRole::Teacher => ProfilePatch::Teacher(TeacherProfilePatch {
                    name: Some(name),
                    ..Default::default()
                }),
            };
            let updated = client.update_profile(patch).await?;
            println!("✅ Profile updated");
            println!("{}", serde_json::to_string_pretty(&updated)?);
        }
    }

    Ok(())
}
