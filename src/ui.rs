//! Terminal output formatting. Pure printing, no interaction.

use console::style;

use crate::domain::{Progress, PublishOutcome, RemoteSyncState, RunStatus, Stage};
use crate::services::VersionInfo;

pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Render one progress event from a publish run.
pub fn display_progress(event: &Progress) {
    match event {
        Progress::StageChanged(Stage::Done) => {}
        Progress::StageChanged(stage) => display_status(&format!("{}...", stage)),
        Progress::RemoteSynced { remote, ok } => {
            if *ok {
                display_success(&format!("synced remote {}", remote));
            } else {
                display_status(&format!("remote {} not synced", remote));
            }
        }
        Progress::PlatformPublished { platform, ok } => {
            if *ok {
                display_success(&format!("published to {}", platform));
            } else {
                display_status(&format!("publish to {} failed", platform));
            }
        }
        Progress::Message(message) => display_status(message),
    }
}

/// Render the final result of a publish run.
pub fn display_outcome(outcome: &PublishOutcome) {
    for remote in &outcome.sync {
        if remote.behind_remote {
            display_status(&format!(
                "remote {} has newer commits; pull before publishing",
                remote.remote
            ));
        } else if let Some(error) = &remote.error {
            display_error(&format!("remote {}: {}", remote.remote, error));
        }
    }

    if let Some(archive) = &outcome.archive {
        display_success(&format!("archive: {}", archive.display()));
    }

    for platform in &outcome.platforms {
        match &platform.result {
            Ok(record) => display_success(&format!("{}: {}", platform.platform, record.url)),
            Err(failure) => display_error(&format!("{}: {}", platform.platform, failure)),
        }
    }

    match &outcome.status {
        RunStatus::Done => display_success("publish complete"),
        RunStatus::PartiallyFailed => display_status("publish completed with failures"),
        RunStatus::Failed { stage, reason } => {
            display_error(&format!("publish failed while {}: {}", stage, reason))
        }
        RunStatus::Busy => display_error("a publish run is already in flight for this project"),
    }
}

/// Render the sync state of one remote.
pub fn display_remote_state(state: &RemoteSyncState) {
    if let Some(error) = &state.last_fetch_error {
        display_error(&format!("{}: fetch failed: {}", state.remote, error));
        return;
    }

    let counts = match (state.ahead, state.behind) {
        (Some(ahead), Some(behind)) => format!("ahead {}, behind {}", ahead, behind),
        _ => "no tracking branch".to_string(),
    };
    if state.behind.is_some_and(|behind| behind > 0) {
        display_status(&format!("{}: {}", state.remote, counts));
    } else {
        display_success(&format!("{}: {}", state.remote, counts));
    }

    if state.has_local_changes {
        display_status(&format!("{}: uncommitted local changes", state.remote));
    }
}

pub fn display_version_info(info: &VersionInfo) {
    match &info.file_path {
        Some(path) => println!("version file: {}", path.display()),
        None => println!("version file: (derived from tags)"),
    }
    match info.version {
        Some(version) => println!("version: {}", style(version).green()),
        None if info.exists => println!("version: {}", style("unparseable").red()),
        None => println!("version: {}", style("none").dim()),
    }
}
