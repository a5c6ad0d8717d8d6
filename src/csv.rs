//! CSV surface: event-file ingestion and the balance report.
//!
//! Event rows are `type,group,from,to,amount,split,days`:
//!
//! - `group` declares a group and its participant list (`split` holds
//!   `1|2|p:7`, with `p:` marking pending members),
//! - `expense` equal-splits `amount` across the `split` participants,
//!   paid by `from` on day `days`,
//! - `settle` records a completed settlement from `from` to `to`,
//!   `days` days late.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::engine::BalanceStatus;
use crate::model::{Category, GroupId, Participant, SECS_PER_DAY, UserId};
use crate::{Amount, Command};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized event type '{event_type}'")]
    UnrecognizedType { line: usize, event_type: String },

    #[error("line {line}: {event_type} missing amount")]
    MissingAmount { line: usize, event_type: String },

    #[error("line {line}: missing {field}")]
    MissingField { line: usize, field: &'static str },

    #[error("line {line}: bad participant '{token}'")]
    BadParticipant { line: usize, token: String },
}

/// A row of the event file: either group setup or a ledger command.
#[derive(Debug, Clone)]
pub enum Event {
    DefineGroup {
        group: GroupId,
        participants: Vec<Participant>,
    },
    Apply(Command),
}

#[derive(Debug, Deserialize)]
struct InputRow {
    r#type: String,
    group: Option<GroupId>,
    from: Option<UserId>,
    to: Option<UserId>,
    amount: Option<f64>,
    split: Option<String>,
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    group: GroupId,
    participant: String,
    balance: String,
    status: &'static str,
}

/// `1` for registered users, `p:7` for pending members.
pub fn participant_label(participant: Participant) -> String {
    match participant {
        Participant::Registered(user) => user.to_string(),
        Participant::Pending(pending) => format!("p:{pending}"),
    }
}

fn parse_participant(line: usize, token: &str) -> Result<Participant, CsvError> {
    let bad = || CsvError::BadParticipant {
        line,
        token: token.to_string(),
    };
    if let Some(rest) = token.strip_prefix("p:") {
        rest.parse().map(Participant::Pending).map_err(|_| bad())
    } else {
        token.parse().map(Participant::Registered).map_err(|_| bad())
    }
}

fn parse_participants(line: usize, split: Option<&str>) -> Result<Vec<Participant>, CsvError> {
    let split = split.filter(|s| !s.is_empty()).ok_or(CsvError::MissingField {
        line,
        field: "split",
    })?;
    split
        .split('|')
        .map(|token| parse_participant(line, token))
        .collect()
}

/// Read events from a csv file
pub fn read_events(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Event, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let group = || {
                row.group.ok_or(CsvError::MissingField {
                    line,
                    field: "group",
                })
            };
            match row.r#type.as_str() {
                "group" => Ok(Event::DefineGroup {
                    group: group()?,
                    participants: parse_participants(line, row.split.as_deref())?,
                }),
                "expense" => {
                    let amount = row.amount.ok_or_else(|| CsvError::MissingAmount {
                        line,
                        event_type: "expense".to_string(),
                    })?;
                    let payer = row.from.ok_or(CsvError::MissingField {
                        line,
                        field: "from",
                    })?;
                    let participants = parse_participants(line, row.split.as_deref())?;
                    let amount = Amount::from_float(amount);
                    let shares = amount.split_even(participants.len());
                    let day = row.days.unwrap_or(0);
                    Ok(Event::Apply(Command::AddExpense {
                        group: group()?,
                        payer,
                        amount,
                        category: Category::Other,
                        splits: participants.into_iter().zip(shares).collect(),
                        at: day * SECS_PER_DAY,
                    }))
                }
                "settle" => {
                    let amount = row.amount.ok_or_else(|| CsvError::MissingAmount {
                        line,
                        event_type: "settle".to_string(),
                    })?;
                    let from = row.from.ok_or(CsvError::MissingField {
                        line,
                        field: "from",
                    })?;
                    let to = row.to.ok_or(CsvError::MissingField { line, field: "to" })?;
                    let days = row.days.unwrap_or(0);
                    Ok(Event::Apply(Command::RecordSettlement {
                        group: group()?,
                        from,
                        to,
                        amount: Amount::from_float(amount),
                        days_delayed: days,
                        at: days * SECS_PER_DAY,
                    }))
                }
                other => Err(CsvError::UnrecognizedType {
                    line,
                    event_type: other.to_string(),
                }),
            }
        })
}

/// Write balance rows to stdout in csv format
pub fn write_balances(
    rows: impl IntoIterator<Item = (GroupId, Participant, Amount, BalanceStatus)>,
) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for (group, participant, balance, status) in rows {
        let row = OutputRow {
            group,
            participant: participant_label(participant),
            balance: balance.to_string(),
            status: status.as_str(),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}
