//! CLI argument parsing and command dispatch.
//!
//! This module provides the command-line interface for flare using clap's derive API.
//! Each command has its own argument struct with validation and helpful error messages.
//!
//! # Commands
//!
//! - `init`: Initialize a new flare workspace
//! - `create`: Declare a new incident
//! - `list`: List incidents with optional filters
//! - `show`: Show incident details
//! - `update`: Update an existing incident
//! - `link`: Set or remove an external link
//! - `sync`: Reconcile participants from the incident channel
//! - `duration`: Convert between duration text and seconds
//!
//! # Global Flags
//!
//! - `--json`: Output in JSON format (applies to all commands)
//!
//! # Example
//!
//! ```bash
//! flare create --title "Checkout errors" --severity P1
//! flare link INC-2000 --kind slack_channel --url https://acme.slack.com/archives/C0INC
//! flare sync INC-2000 --directory directory.yaml --force
//! flare update INC-2000 --status mitigated --downtime "1h 30m"
//! ```

mod args;
mod execute;
mod types;
mod validators;

use anyhow::Result;
use clap::{Parser, Subcommand};

// Re-export argument structs
pub use args::{
    CreateArgs, DurationAction, DurationArgs, InitArgs, LinkArgs, ListArgs, ShowArgs, SyncArgs,
    UpdateArgs,
};

// Re-export types
pub use types::{LinkTypeArg, SeverityArg, StatusArg, TagKindArg, TierArg};

// Re-export validators for external use
pub use validators::{validate_incident_id, validate_prefix, validate_title};

/// Flare - incident tracking with gapless IDs and chat-channel participant sync
///
/// Incidents are stored in `.flare/incidents.jsonl` for easy version control integration.
#[derive(Parser, Debug)]
#[command(name = "flare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format for programmatic use
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Initialize a new flare workspace
    ///
    /// Creates the `.flare/` directory with configuration and an empty incident store.
    Init(InitArgs),

    /// Declare a new incident
    ///
    /// The incident receives the next number from the gapless counter.
    Create(CreateArgs),

    /// List incidents, newest first
    List(ListArgs),

    /// Show detailed information about an incident
    Show(ShowArgs),

    /// Update an existing incident
    ///
    /// Only provided fields are updated; other fields remain unchanged.
    Update(UpdateArgs),

    /// Set or remove an external link (chat channel, ticket, postmortem doc)
    Link(LinkArgs),

    /// Reconcile incident participants from the linked chat channel
    ///
    /// Channel members are added as participants; nobody is ever removed.
    /// Incidents synced within the throttle window are skipped unless `--force`.
    Sync(SyncArgs),

    /// Convert between duration text and seconds
    Duration(DurationArgs),
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }

    /// Parse CLI arguments from an iterator (for testing)
    pub fn try_parse_from<I, T>(iter: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(iter)
    }

    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        use crate::app::App;
        use crate::output::OutputMode;

        let output_mode = if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };

        match &self.command {
            Some(Commands::Init(args)) => execute::execute_init(args).await,
            Some(Commands::Create(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_create(&app, args, output_mode).await
            }
            Some(Commands::List(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_list(&app, args, output_mode).await
            }
            Some(Commands::Show(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_show(&app, args, output_mode).await
            }
            Some(Commands::Update(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_update(&app, args, output_mode).await
            }
            Some(Commands::Link(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_link(&app, args, output_mode).await
            }
            Some(Commands::Sync(args)) => {
                let app = App::from_directory(&std::env::current_dir()?).await?;
                execute::execute_sync(&app, args, output_mode).await
            }
            Some(Commands::Duration(args)) => execute::execute_duration(args, output_mode).await,
            None => {
                println!("Flare incident tracking");
                println!("Use --help for more information");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IncidentId;

    // ========== CLI Parsing Tests ==========

    #[test]
    fn test_parse_no_command() {
        let cli = Cli::try_parse_from(["flare"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_parse_global_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["flare", "list", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Some(Commands::List(_))));
    }

    #[test]
    fn test_parse_init_with_prefix() {
        let cli =
            Cli::try_parse_from(["flare", "init", "--prefix", "OPS", "--id-floor", "100"]).unwrap();
        match cli.command {
            Some(Commands::Init(args)) => {
                assert_eq!(args.prefix, Some("OPS".to_string()));
                assert_eq!(args.id_floor, Some(100));
                assert!(!args.quiet);
            }
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_parse_init_rejects_short_prefix() {
        assert!(Cli::try_parse_from(["flare", "init", "--prefix", "X"]).is_err());
    }

    #[test]
    fn test_parse_init_rejects_zero_floor() {
        assert!(Cli::try_parse_from(["flare", "init", "--id-floor", "0"]).is_err());
    }

    #[test]
    fn test_parse_create_full() {
        let cli = Cli::try_parse_from([
            "flare",
            "create",
            "--title",
            "Checkout errors",
            "--severity",
            "p1",
            "--tier",
            "T0",
            "--private",
            "--downtime",
            "1h 30m",
            "--captain",
            "alice@example.com",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.title, "Checkout errors");
                assert_eq!(args.severity, SeverityArg::P1);
                assert_eq!(args.tier, Some(TierArg::T0));
                assert!(args.private);
                assert_eq!(args.downtime.as_deref(), Some("1h 30m"));
                assert_eq!(args.captain.as_deref(), Some("alice@example.com"));
            }
            _ => panic!("Expected Create command"),
        }
    }

    #[test]
    fn test_parse_create_requires_severity() {
        assert!(Cli::try_parse_from(["flare", "create", "--title", "Outage"]).is_err());
    }

    #[test]
    fn test_parse_create_rejects_bad_downtime() {
        let result = Cli::try_parse_from([
            "flare",
            "create",
            "--title",
            "Outage",
            "--severity",
            "P2",
            "--downtime",
            "1h 1h",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_list_as_user() {
        let cli = Cli::try_parse_from([
            "flare",
            "list",
            "--as",
            "bob@example.com",
            "--superuser",
            "--status",
            "active",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::List(args)) => {
                assert_eq!(args.as_user.as_deref(), Some("bob@example.com"));
                assert!(args.superuser);
                assert_eq!(args.status, Some(StatusArg::Active));
                assert_eq!(args.limit, 50);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_parse_list_superuser_requires_as() {
        assert!(Cli::try_parse_from(["flare", "list", "--superuser"]).is_err());
    }

    #[test]
    fn test_parse_show_accepts_key() {
        let cli = Cli::try_parse_from(["flare", "show", "INC-2000"]).unwrap();
        match cli.command {
            Some(Commands::Show(args)) => assert_eq!(args.id, IncidentId::new(2000)),
            _ => panic!("Expected Show command"),
        }
    }

    #[test]
    fn test_parse_update_with_tags_and_clear_downtime() {
        let cli = Cli::try_parse_from([
            "flare",
            "update",
            "2001",
            "--status",
            "mitigated",
            "--clear-downtime",
            "--tag",
            "service=Payments",
            "--tag",
            "root-cause=bad deploy",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Update(args)) => {
                assert_eq!(args.id, IncidentId::new(2001));
                assert_eq!(args.status, Some(StatusArg::Mitigated));
                assert!(args.clear_downtime);
                assert_eq!(
                    args.tags,
                    vec![
                        (TagKindArg::AffectedService, "Payments".to_string()),
                        (TagKindArg::RootCause, "bad deploy".to_string()),
                    ]
                );
            }
            _ => panic!("Expected Update command"),
        }
    }

    #[test]
    fn test_parse_update_downtime_conflicts_with_clear() {
        let result = Cli::try_parse_from([
            "flare",
            "update",
            "2001",
            "--downtime",
            "5m",
            "--clear-downtime",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_link_set_and_remove() {
        let cli = Cli::try_parse_from([
            "flare",
            "link",
            "INC-2000",
            "--kind",
            "slack_channel",
            "--url",
            "https://acme.slack.com/archives/C0INC",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Link(args)) => {
                assert_eq!(args.kind, LinkTypeArg::SlackChannel);
                assert!(!args.remove);
            }
            _ => panic!("Expected Link command"),
        }

        let cli =
            Cli::try_parse_from(["flare", "link", "2000", "--kind", "runbook", "--remove"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Link(args)) if args.remove));
    }

    #[test]
    fn test_parse_link_requires_url_or_remove() {
        assert!(Cli::try_parse_from(["flare", "link", "2000", "--kind", "runbook"]).is_err());
    }

    #[test]
    fn test_parse_sync_many() {
        let cli = Cli::try_parse_from([
            "flare",
            "sync",
            "INC-2000",
            "2001",
            "--directory",
            "dir.yaml",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Sync(args)) => {
                assert_eq!(args.ids, vec![IncidentId::new(2000), IncidentId::new(2001)]);
                assert!(args.force);
                assert!(!args.publish_topic);
            }
            _ => panic!("Expected Sync command"),
        }
    }

    #[test]
    fn test_parse_sync_requires_directory() {
        assert!(Cli::try_parse_from(["flare", "sync", "2000"]).is_err());
    }

    #[test]
    fn test_parse_duration_actions() {
        let cli = Cli::try_parse_from(["flare", "duration", "parse", "2h 5m"]).unwrap();
        match cli.command {
            Some(Commands::Duration(DurationArgs {
                action: DurationAction::Parse { text },
            })) => assert_eq!(text, "2h 5m"),
            _ => panic!("Expected duration parse"),
        }

        let cli = Cli::try_parse_from(["flare", "duration", "format", "5400"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Duration(DurationArgs {
                action: DurationAction::Format { seconds: 5400 },
            }))
        ));
    }
}
