//! Conflicts command - Manage file conflicts
//!
//! Provides the `attsync conflicts` CLI command which:
//! 1. Lists attachments changed both locally and remotely
//! 2. Resolves them, either with one side for all (`--keep`) or by asking
//!    for each conflict on the terminal
//!
//! Resolving only records the choice; the next sync moves the data.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use attsync_core::{
    domain::{ConflictCase, ItemSnapshot},
    ports::IConflictPrompt,
};
use clap::{Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use super::{LibraryArg, Session};
use crate::output::{get_formatter, OutputFormat};

/// Side to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Side {
    Local,
    Remote,
}

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// List unresolved conflicts
    List {
        #[command(flatten)]
        library: LibraryArg,
    },
    /// Resolve conflicts
    Resolve {
        #[command(flatten)]
        library: LibraryArg,
        /// Keep this side for every conflict instead of asking
        #[arg(long, value_enum)]
        keep: Option<Side>,
    },
}

impl ConflictsCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConflictsCommand::List { library } => {
                self.execute_list(config_path, *library, format).await
            }
            ConflictsCommand::Resolve { library, keep } => {
                self.execute_resolve(config_path, *library, *keep, format)
                    .await
            }
        }
    }

    async fn execute_list(
        &self,
        config_path: &Path,
        library: LibraryArg,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };

        let cases = session.resolver().list_conflicts(library.id()).await?;
        info!(count = cases.len(), "Retrieved conflicts");

        if format.is_json() {
            let json = serde_json::json!({
                "count": cases.len(),
                "conflicts": serde_json::to_value(&cases)?,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        if cases.is_empty() {
            formatter.success("No conflicts");
            return Ok(());
        }

        formatter.success(&format!(
            "{} conflict{}",
            cases.len(),
            if cases.len() == 1 { "" } else { "s" }
        ));
        formatter.info("");
        formatter.info("        ID Key      Local modified      Remote modified");
        formatter.info("  -------- -------- ------------------- -------------------");
        for case in &cases {
            formatter.info(&format!(
                "{:>8} {:<8} {} {}",
                case.attachment_id.as_i64(),
                case.local.key.as_str(),
                format_time(&case.local),
                format_time(&case.remote)
            ));
        }
        formatter.info("");
        formatter.info("Use 'attsync conflicts resolve [--keep local|remote]' to resolve.");
        Ok(())
    }

    async fn execute_resolve(
        &self,
        config_path: &Path,
        library: LibraryArg,
        keep: Option<Side>,
        format: OutputFormat,
    ) -> Result<()> {
        let json = format.is_json();
        let formatter = get_formatter(format);
        let Some(session) = Session::open(config_path, &*formatter).await? else {
            return Ok(());
        };

        let resolver = session.resolver();
        let resolved = match keep {
            Some(side) => {
                resolver
                    .resolve_conflicts(library.id(), &UniformPrompt(side))
                    .await?
            }
            None if json => bail!("--keep is required with --json"),
            None => {
                resolver
                    .resolve_conflicts(library.id(), &TerminalPrompt)
                    .await?
            }
        };

        if json {
            formatter.print_json(&serde_json::json!({ "resolved": resolved }));
        } else if resolved {
            formatter.success("Conflicts resolved; the next sync transfers the chosen files");
        } else {
            formatter.info("Nothing resolved");
        }
        Ok(())
    }
}

fn format_time(snapshot: &ItemSnapshot) -> String {
    snapshot
        .date_modified()
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn chosen(case: &ConflictCase, side: Side) -> ItemSnapshot {
    match side {
        Side::Local => case.local.clone(),
        Side::Remote => case.remote.clone(),
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Keeps the same side for every conflict
struct UniformPrompt(Side);

#[async_trait::async_trait]
impl IConflictPrompt for UniformPrompt {
    async fn resolve(&self, cases: &[ConflictCase]) -> anyhow::Result<Option<Vec<ItemSnapshot>>> {
        Ok(Some(cases.iter().map(|c| chosen(c, self.0)).collect()))
    }
}

/// Asks on the terminal for each conflict; `q` cancels everything
struct TerminalPrompt;

#[async_trait::async_trait]
impl IConflictPrompt for TerminalPrompt {
    async fn resolve(&self, cases: &[ConflictCase]) -> anyhow::Result<Option<Vec<ItemSnapshot>>> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut choices = Vec::with_capacity(cases.len());

        for (n, case) in cases.iter().enumerate() {
            println!();
            println!(
                "[{}/{}] {} ({})",
                n + 1,
                cases.len(),
                case.local.file_name.as_deref().unwrap_or(case.local.key.as_str()),
                case.attachment_id
            );
            println!("  local:  modified {}", format_time(&case.local));
            println!("  remote: modified {}", format_time(&case.remote));

            let side = loop {
                print!("Keep [l]ocal, [r]emote, or [q]uit? ");
                std::io::stdout().flush()?;
                let Some(line) = lines.next_line().await? else {
                    return Ok(None);
                };
                match parse_answer(&line) {
                    Some(Answer::Keep(side)) => break side,
                    Some(Answer::Quit) => return Ok(None),
                    None => println!("Please answer l, r or q."),
                }
            };
            choices.push(chosen(case, side));
        }
        Ok(Some(choices))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Answer {
    Keep(Side),
    Quit,
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "l" | "local" => Some(Answer::Keep(Side::Local)),
        "r" | "remote" => Some(Answer::Keep(Side::Remote)),
        "q" | "quit" => Some(Answer::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::domain::{AttachmentId, Decision, ItemKey, LibraryId, ModTime};

    fn case() -> ConflictCase {
        let key = ItemKey::new("ABCD2345".to_string()).unwrap();
        ConflictCase::new(
            LibraryId::new(1),
            AttachmentId::new(9),
            ItemSnapshot::new(key.clone(), 3, ModTime::from_millis(1_000_000)),
            ItemSnapshot::new(key, 3, ModTime::from_millis(2_000_000)),
        )
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("l"), Some(Answer::Keep(Side::Local)));
        assert_eq!(parse_answer(" Remote\n"), Some(Answer::Keep(Side::Remote)));
        assert_eq!(parse_answer("q"), Some(Answer::Quit));
        assert_eq!(parse_answer("maybe"), None);
        assert_eq!(parse_answer(""), None);
    }

    #[tokio::test]
    async fn test_uniform_prompt_choices_decide_sides() {
        let cases = vec![case(), case()];

        let choices = UniformPrompt(Side::Remote)
            .resolve(&cases)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(choices.len(), 2);

        let mut decided = cases[0].clone();
        assert_eq!(decided.decide(&choices[0]), Decision::KeepRemote);

        let local = UniformPrompt(Side::Local).resolve(&cases).await.unwrap().unwrap();
        let mut decided = cases[1].clone();
        assert_eq!(decided.decide(&local[1]), Decision::KeepLocal);
    }
}
