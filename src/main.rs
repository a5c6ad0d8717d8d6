use std::collections::BTreeSet;
use std::env;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use splitledger::csv::{Event, read_events, write_balances};
use splitledger::model::Participant;
use splitledger::{LedgerEngine, MemStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: splitledger <events.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    // First pass: group definitions become directory state.
    let mut store = MemStore::new();
    let mut groups = BTreeSet::new();
    for event in read_events(&path).flatten() {
        if let Event::DefineGroup {
            group,
            participants,
        } = event
        {
            let mut members = Vec::new();
            let mut pending_members = Vec::new();
            for participant in participants {
                match participant {
                    Participant::Registered(user) => {
                        store.ensure_user(user);
                        members.push(user);
                    }
                    Participant::Pending(pending) => {
                        store.ensure_pending_member(pending, group);
                        pending_members.push(pending);
                    }
                }
            }
            store.add_group(group, format!("group-{group}"), members, pending_members);
            groups.insert(group);
        }
    }

    // Second pass: stream the commands through the engine.
    let mut engine = LedgerEngine::new(store);
    let (event_sender, event_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_events(&path) {
            match result {
                Ok(Event::Apply(command)) => {
                    event_sender.send(command).await.unwrap();
                }
                Ok(Event::DefineGroup { .. }) => {}
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(event_receiver)).await;

    let mut rows = Vec::new();
    for group in groups {
        match engine.group_balances(group) {
            Ok(balances) => {
                for entry in balances.active.into_iter().chain(balances.pending) {
                    rows.push((group, entry.participant, entry.balance, entry.status));
                }
            }
            Err(e) => warn!(group, "{e}"),
        }
    }
    write_balances(rows);
}
