//! The report pipeline
//!
//! One linear pass per invocation: fetch the query result, normalize row
//! field order, partition rows by recipient, then render and dispatch one
//! message per group. The empty-result policy is evaluated once, before
//! any message goes out.

pub mod normalize;
pub mod partition;
pub mod render;

pub use normalize::{normalize, NormalizedRow};
pub use partition::{partition, RecipientGroup};
pub use render::render;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mail::{Attachment, MailTransport, OutboundMessage};
use crate::redash::QueryClient;
use tracing::{debug, info, warn};

/// Why a run finished without dispatching anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The query returned no rows and `send_on_empty` is off
    EmptyResult,
    /// The query returned rows and `send_only_on_empty` is on
    NonEmptyResult,
}

/// Outcome of a successful run. A skip is not an error, but it must stay
/// distinguishable from an actual send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Sent { messages: usize },
    Skipped(SkipReason),
}

/// Run the whole pipeline for one invocation.
pub async fn run(
    config: &Config,
    query: &dyn QueryClient,
    mailer: &dyn MailTransport,
) -> Result<RunOutcome> {
    info!(
        "Starting report run '{}' for query {}",
        config.event_name, config.query_id
    );

    let data = query.fetch(&config.query_id).await?;
    let rows = normalize(&data.rows, &data.columns)?;
    let groups = partition(rows, &config.to_address)?;

    let total_rows: usize = groups.iter().map(|g| g.rows.len()).sum();
    let has_rows = total_rows > 0;
    debug!(
        "Partitioned {} rows into {} recipient groups",
        total_rows,
        groups.len()
    );

    if !has_rows && !config.send_on_empty {
        info!("Query returned no rows and send_on_empty is off; skipping");
        return Ok(RunOutcome::Skipped(SkipReason::EmptyResult));
    }
    if has_rows && config.send_only_on_empty {
        info!("Query returned rows and send_only_on_empty is on; skipping");
        return Ok(RunOutcome::Skipped(SkipReason::NonEmptyResult));
    }

    let mut body_text = config.body.clone();
    if !has_rows && config.append_empty_note {
        body_text.push_str("\n No data was returned; skipping attachment.");
    }
    let filename = format!("query_{}_results.csv", config.query_id);

    let mut sent = 0usize;
    let mut failures: Vec<String> = Vec::new();
    for group in &groups {
        let attachment = if group.rows.is_empty() {
            None
        } else {
            Some(Attachment {
                filename: filename.clone(),
                bytes: render(&group.rows)?.into_bytes(),
            })
        };
        let message = OutboundMessage {
            subject: config.subject.clone(),
            from: config.from_address.clone(),
            to: group.recipient_key.clone(),
            body_text: body_text.clone(),
            attachment,
        };

        // One bad recipient must not block the rest of the groups.
        match mailer.send(&message).await {
            Ok(()) => {
                info!(
                    "Sent {} row(s) to '{}'",
                    group.rows.len(),
                    group.recipient_key
                );
                sent += 1;
            }
            Err(e) => {
                warn!("Send to '{}' failed: {}", group.recipient_key, e);
                failures.push(format!("'{}': {}", group.recipient_key, e));
            }
        }
    }

    if !failures.is_empty() {
        return Err(Error::Dispatch(format!(
            "{} of {} message(s) failed: {}",
            failures.len(),
            groups.len(),
            failures.join("; ")
        )));
    }

    info!("Report run complete: {} message(s) sent", sent);
    Ok(RunOutcome::Sent { messages: sent })
}
