//! Incremental reposting engine
//!
//! One pass pulls every mention newer than the watermark, decides per mention
//! what to do, performs the side effect and only then moves the watermark past
//! that mention. A failure aborts the pass with the watermark pointing at the
//! last mention that was fully handled, so the next run resumes there.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Configuration;
use crate::error::Result;
use crate::platforms::Instance;
use crate::types::{Mention, MentionedStatus, StatusId};
use crate::watermark::Watermark;

/// First-stage decision for a mention, made without network access
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triage {
    /// The mentioning post is gone; nothing to do, watermark untouched
    NoStatus,
    /// Author is not on the allow-list
    NotAllowed(MentionedStatus),
    /// Eligible; still needs the reblogger check
    Candidate(MentionedStatus),
}

/// Classify `mention` against the allow-list
///
/// Mentions returned again by the server are not filtered here; the reblogger
/// check keeps them from being reblogged twice.
pub fn triage(mention: &Mention, config: &Configuration) -> Triage {
    let Some(status) = &mention.status else {
        return Triage::NoStatus;
    };
    let status = status.clone();

    if !config.is_allowed(&status.acct) {
        Triage::NotAllowed(status)
    } else {
        Triage::Candidate(status)
    }
}

/// Whether the configured account is among `rebloggers`
pub fn already_reblogged(config: &Configuration, rebloggers: &[String]) -> bool {
    rebloggers
        .iter()
        .any(|acct| config.account_name.matches(acct))
}

/// Totals for one pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mentions: usize,
    pub reblogged: Vec<StatusId>,
    /// Reblogs skipped because of dry-run
    pub would_reblog: Vec<StatusId>,
    pub already_reblogged: usize,
    pub not_allowed: usize,
    pub without_status: usize,
    pub since_id: Option<StatusId>,
}

/// Reposting engine for one configured account
pub struct Retooter {
    config: Configuration,
    instance: Box<dyn Instance>,
    watermark: Watermark,
}

impl Retooter {
    pub fn new(config: Configuration, instance: Box<dyn Instance>, watermark: Watermark) -> Self {
        Self {
            config,
            instance,
            watermark,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Reblog every allow-listed mention not yet reblogged by the account
    ///
    /// # Errors
    ///
    /// Remote failures and watermark write failures abort the pass. Mentions
    /// handled before the failure stay recorded in the watermark file.
    pub async fn repost_mentions(&mut self) -> Result<RunSummary> {
        let since_id = self.watermark.current();
        info!(?since_id, "Fetching mentions");

        let mut mentions = self.instance.mentions_since(since_id).await?;
        // Oldest first, so an aborted pass never leaves older mentions behind the
        // watermark. Mentions without a status sort to the front.
        mentions.sort_by_key(Mention::status_id);

        let mut summary = RunSummary {
            mentions: mentions.len(),
            ..Default::default()
        };

        for mention in &mentions {
            self.process(mention, &mut summary).await?;
        }

        self.watermark.persist()?;
        summary.since_id = self.watermark.current();

        info!(
            mentions = summary.mentions,
            reblogged = summary.reblogged.len(),
            would_reblog = summary.would_reblog.len(),
            since_id = ?summary.since_id,
            "Finished reposting pass"
        );
        Ok(summary)
    }

    async fn process(&mut self, mention: &Mention, summary: &mut RunSummary) -> Result<()> {
        let status = match triage(mention, &self.config) {
            Triage::NoStatus => {
                debug!(notification_id = %mention.notification_id, "Skipping mention without status");
                summary.without_status += 1;
                return Ok(());
            }
            Triage::NotAllowed(status) => {
                info!(status_id = status.id, acct = %status.acct, "Mentioned by account not on allow-list");
                summary.not_allowed += 1;
                status
            }
            Triage::Candidate(status) => {
                info!(status_id = status.id, acct = %status.acct, "Mentioned in post");
                self.repost(&status, summary).await?;
                status
            }
        };

        self.watermark.advance(status.id)?;
        Ok(())
    }

    async fn repost(&self, status: &MentionedStatus, summary: &mut RunSummary) -> Result<()> {
        let rebloggers = self.instance.reblogged_by(status.id).await?;
        if already_reblogged(&self.config, &rebloggers) {
            debug!(status_id = status.id, "Already reblogged");
            summary.already_reblogged += 1;
            return Ok(());
        }

        if self.config.dry_run {
            info!(
                status_id = status.id,
                acct = %status.acct,
                "Dry run, not actually reblogging"
            );
            summary.would_reblog.push(status.id);
            return Ok(());
        }

        info!(status_id = status.id, acct = %status.acct, "Reblogging");
        self.instance.reblog(status.id).await?;
        summary.reblogged.push(status.id);
        Ok(())
    }
}
