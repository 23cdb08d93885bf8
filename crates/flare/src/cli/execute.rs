//! Command execution logic.
//!
//! This module contains the implementation of all CLI commands.

use anyhow::{bail, Result};
use std::sync::Arc;

use super::args::{
    CreateArgs, DurationAction, DurationArgs, InitArgs, LinkArgs, ListArgs, ShowArgs, SyncArgs,
    UpdateArgs,
};
use crate::app::App;
use crate::directory::StaticDirectory;
use crate::domain::{IncidentFilter, IncidentUpdate, LinkType, NewIncident, UserId};
use crate::output::{self, OutputMode, UserNames};
use crate::users::UserResolver;
use crate::visibility::{filter_visible, Viewer};

/// Execute the init command
pub async fn execute_init(args: &InitArgs) -> Result<()> {
    use crate::commands::init;

    let current_dir = std::env::current_dir()?;

    if !args.quiet {
        println!(
            "Initializing flare workspace{}...",
            args.prefix
                .as_ref()
                .map(|p| format!(" with prefix '{}'", p))
                .unwrap_or_default()
        );
    }

    let options = init::InitOptions {
        prefix: args.prefix.clone(),
        id_floor: args.id_floor,
    };
    let result = init::init(&current_dir, &options).await?;

    if !args.quiet {
        println!("Initialized flare in {}", result.flare_dir.display());
        println!("  Config: {}", result.config_file.display());
        println!("  Incidents: {}", result.incidents_file.display());
        println!("  Incident prefix: {}", result.config.incident_prefix);
        println!("  First incident: {}", result.first_key());
    }

    Ok(())
}

/// Execute the create command
pub async fn execute_create(app: &App, args: &CreateArgs, output_mode: OutputMode) -> Result<()> {
    let resolver = offline_resolver(app);
    let captain = resolve_email(&resolver, args.captain.as_deref()).await?;
    let reporter = resolve_email(&resolver, args.reporter.as_deref()).await?;

    let new_incident = NewIncident {
        title: args.title.clone(),
        description: args.description.clone().unwrap_or_default(),
        severity: Some(args.severity.into()),
        service_tier: args.tier.map(Into::into),
        is_private: args.private,
        captain,
        reporter,
        downtime: args.downtime.clone(),
    };

    let incident = app.storage().create(new_incident).await?;
    app.save().await?;

    match output_mode {
        OutputMode::Json => {
            output::print_json(&output::IncidentView::new(&incident, app.prefix()))?;
        }
        OutputMode::Text => {
            println!(
                "Created incident {}: {}",
                incident.key(app.prefix()),
                incident.title
            );
        }
    }

    Ok(())
}

/// Execute the list command
pub async fn execute_list(app: &App, args: &ListArgs, output_mode: OutputMode) -> Result<()> {
    let filter = IncidentFilter {
        status: args.status.map(Into::into),
        severity: args.severity.map(Into::into),
        participant: None,
        limit: None,
    };
    let incidents = app.storage().list(&filter).await?;

    // Without --as the local operator sees the whole workspace
    let mut incidents = match &args.as_user {
        Some(email) => {
            let Some(user) = app.storage().find_user_by_email(email).await? else {
                bail!("Unknown user: {}", email);
            };
            let mut viewer = Viewer::from(&user);
            viewer.is_superuser |= args.superuser;
            filter_visible(incidents, Some(&viewer))
        }
        None => incidents,
    };
    incidents.truncate(args.limit);

    output::print_incidents(&incidents, app.prefix(), output_mode)?;
    Ok(())
}

/// Execute the show command
pub async fn execute_show(app: &App, args: &ShowArgs, output_mode: OutputMode) -> Result<()> {
    let Some(incident) = app.storage().get(args.id).await? else {
        bail!("Incident not found: {}", args.id.key(app.prefix()));
    };

    let mut names = UserNames::new();
    let referenced = incident
        .captain
        .into_iter()
        .chain(incident.reporter)
        .chain(incident.participants.iter().copied());
    for user_id in referenced {
        if names.contains_key(&user_id) {
            continue;
        }
        if let Some(user) = app.storage().get_user(user_id).await? {
            names.insert(user_id, user.name());
        }
    }

    output::print_incident(&incident, app.prefix(), &names, output_mode)?;
    Ok(())
}

/// Execute the update command
pub async fn execute_update(app: &App, args: &UpdateArgs, output_mode: OutputMode) -> Result<()> {
    let captain = match args.captain.as_deref() {
        Some(email) => Some(resolve_email(&offline_resolver(app), Some(email)).await?),
        None => None,
    };
    let downtime = if args.clear_downtime {
        Some(None)
    } else {
        args.downtime.clone().map(Some)
    };

    let updates = IncidentUpdate {
        title: args.title.clone(),
        description: args.description.clone(),
        status: args.status.map(Into::into),
        severity: args.severity.map(Into::into),
        service_tier: args.tier.map(|tier| Some(tier.into())),
        is_private: args.private,
        captain,
        reporter: None,
        downtime,
    };
    let has_field_updates = updates.title.is_some()
        || updates.description.is_some()
        || updates.status.is_some()
        || updates.severity.is_some()
        || updates.service_tier.is_some()
        || updates.is_private.is_some()
        || updates.captain.is_some()
        || updates.downtime.is_some();

    if !has_field_updates && args.tags.is_empty() {
        bail!("No updates specified. Use --help to see available options.");
    }

    let storage = app.storage();
    let mut incident = if has_field_updates {
        storage.update(args.id, updates).await?
    } else {
        match storage.get(args.id).await? {
            Some(incident) => incident,
            None => bail!("Incident not found: {}", args.id.key(app.prefix())),
        }
    };
    for (kind, name) in &args.tags {
        incident = storage.add_tag(args.id, (*kind).into(), name).await?;
    }
    app.save().await?;

    match output_mode {
        OutputMode::Json => {
            output::print_json(&output::IncidentView::new(&incident, app.prefix()))?;
        }
        OutputMode::Text => {
            println!(
                "Updated incident {}: {}",
                incident.key(app.prefix()),
                incident.title
            );
        }
    }

    Ok(())
}

/// Execute the link command
pub async fn execute_link(app: &App, args: &LinkArgs, output_mode: OutputMode) -> Result<()> {
    let link_type: LinkType = args.kind.into();
    let storage = app.storage();

    let incident = match (&args.url, args.remove) {
        (_, true) => storage.remove_external_link(args.id, link_type).await?,
        (Some(url), false) => storage.set_external_link(args.id, link_type, url).await?,
        (None, false) => bail!("Either --url or --remove is required"),
    };
    app.save().await?;

    match output_mode {
        OutputMode::Json => {
            output::print_json(&output::IncidentView::new(&incident, app.prefix()))?;
        }
        OutputMode::Text => {
            let key = incident.key(app.prefix());
            match incident.external_link(link_type) {
                Some(url) => println!("Linked {key} {link_type}: {url}"),
                None => println!("Removed {link_type} link from {key}"),
            }
        }
    }

    Ok(())
}

/// Execute the sync command
pub async fn execute_sync(app: &App, args: &SyncArgs, output_mode: OutputMode) -> Result<()> {
    let directory = StaticDirectory::load(&args.directory).await?;
    let sync = app.participant_sync(Arc::new(directory));
    let prefix = app.prefix();

    let outcomes = sync.reconcile_many(&args.ids, args.force).await;

    let mut failures = Vec::new();
    let mut json_results = Vec::new();
    for (id, outcome) in outcomes {
        let key = id.key(prefix);
        match outcome {
            Ok(result) => {
                let topic_published = if args.publish_topic && !result.skipped {
                    sync.publish_topic(id).await?
                } else {
                    false
                };
                match output_mode {
                    OutputMode::Json => json_results.push(serde_json::json!({
                        "incident": key,
                        "result": result,
                        "topic_published": topic_published,
                    })),
                    OutputMode::Text => {
                        output::print_sync_result(&key, &result, output_mode)?;
                        if topic_published {
                            println!("  topic updated");
                        }
                    }
                }
            }
            Err(e) => {
                if output_mode == OutputMode::Json {
                    json_results.push(serde_json::json!({
                        "incident": key,
                        "error": e.to_string(),
                    }));
                } else {
                    eprintln!("{key}: {e}");
                }
                failures.push(key);
            }
        }
    }

    app.save().await?;

    if output_mode == OutputMode::Json {
        output::print_json(&json_results)?;
    }

    if !failures.is_empty() {
        bail!("Failed to sync {}", failures.join(", "));
    }
    Ok(())
}

/// Execute the duration command
pub async fn execute_duration(args: &DurationArgs, output_mode: OutputMode) -> Result<()> {
    use crate::duration;

    let (text, seconds) = match &args.action {
        DurationAction::Parse { text } => (text.trim().to_string(), duration::parse(text)?),
        DurationAction::Format { seconds } => (duration::format(*seconds), *seconds),
    };

    match output_mode {
        OutputMode::Json => {
            output::print_json(&serde_json::json!({ "text": text, "seconds": seconds }))?;
        }
        OutputMode::Text => match &args.action {
            DurationAction::Parse { .. } => output::print_message(&seconds.to_string())?,
            DurationAction::Format { .. } => output::print_message(&text)?,
        },
    }

    Ok(())
}

/// Resolver for commands that run without a chat directory.
fn offline_resolver(app: &App) -> UserResolver {
    app.user_resolver(Arc::new(StaticDirectory::new()))
}

async fn resolve_email(resolver: &UserResolver, email: Option<&str>) -> Result<Option<UserId>> {
    match email {
        Some(email) => Ok(Some(resolver.resolve_by_email(email).await?.id)),
        None => Ok(None),
    }
}
