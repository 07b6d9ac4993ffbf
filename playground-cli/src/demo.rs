//! `room-demo`: several in-process participants sharing one room.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use playground_collab::{
    ChannelConfig, CodeChannel, EditorBinding, HubConfig, Participant, RoomHub, SessionManager,
};
use playground_core::language::descriptor;
use playground_core::{ExecutionEngine, ExecutionRequest, LanguageId, TerminalText};

const MAX_PARTICIPANTS: usize = 16;

struct Member {
    session: SessionManager,
    channel: CodeChannel,
    editor: EditorBinding,
}

pub async fn run(room: Option<&str>, participants: usize, language: &str) -> Result<()> {
    if participants == 0 || participants > MAX_PARTICIPANTS {
        bail!("participants must be between 1 and {MAX_PARTICIPANTS}");
    }
    let language: LanguageId = language.parse()?;
    let hub = Arc::new(RoomHub::new(HubConfig::default()));

    let mut members: Vec<Member> = (1..=participants)
        .map(|i| {
            let session =
                SessionManager::new(Participant::new(format!("Participant {i}")), hub.clone());
            let channel = CodeChannel::new(&session, ChannelConfig::multi_party());
            Member {
                session,
                channel,
                editor: EditorBinding::new(language),
            }
        })
        .collect();

    let room_id = match room {
        Some(raw) => members[0].session.join(raw).await?.room_id,
        None => Some(members[0].session.create_room().await?),
    };
    let Some(room_id) = room_id else {
        bail!("host did not end up in a room");
    };
    for member in &members[1..] {
        member.session.join(room_id.as_str()).await?;
    }
    // Presence announcements are applied by background tasks.
    tokio::time::sleep(Duration::from_millis(20)).await;

    println!("Joined room {room_id}");
    for member in &members {
        let snapshot = member.session.snapshot().await;
        println!(
            "  {:<16} {}",
            member.session.local_participant().name,
            snapshot.status_line().unwrap_or_default()
        );
    }

    // Everyone edits before seeing anyone else's change.
    let starter = descriptor(language).default_source;
    for member in &mut members {
        let name = member.session.local_participant().name.clone();
        let text = starter.replace("Hello, World!", &format!("Hello from {name}!"));
        member.editor.edit(text.clone());
        member.channel.send_update(&text, language).await?;
    }
    for member in &mut members {
        for update in member.channel.poll_updates().await {
            member.editor.apply_remote(&update);
        }
    }

    println!("\nAfter concurrent edits:");
    for member in &members {
        println!(
            "  {:<16} {:?}",
            member.session.local_participant().name,
            member.editor.text()
        );
    }
    let converged = members
        .windows(2)
        .all(|pair| pair[0].editor.text() == pair[1].editor.text());
    println!("Converged: {converged}");

    let engine = ExecutionEngine::with_defaults();
    let outcome = engine
        .execute(ExecutionRequest::for_language(members[0].editor.text(), language))
        .await;
    println!("\n{}", TerminalText::from_outcome(&outcome));

    for member in &members {
        member.session.leave().await;
    }
    log::info!("Room {room_id} closed; {} rooms open", hub.room_count().await);
    Ok(())
}
