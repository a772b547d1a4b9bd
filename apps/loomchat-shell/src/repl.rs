//! The chat loop: one send in flight at a time, replies drained to
//! completion before the next prompt.

use anyhow::Result;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

use loomchat_client_core::auth::UserIdentity;
use loomchat_client_core::page::ChatLayout;
use loomchat_client_core::session::ChatSession;
use loomchat_client_core::stream::StreamEvent;
use loomchat_client_core::transcript::{SpeakerRole, TranscriptState};
use loomchat_thread_client::{ReplyStream, ThreadServiceClient};

use crate::render;

pub async fn run_chat(
    client: ThreadServiceClient,
    layout: ChatLayout,
    resume: Option<String>,
    user: Option<UserIdentity>,
) -> Result<()> {
    let mut session = ChatSession::new(client);
    let mut transcript = TranscriptState::default();

    render::welcome(layout, user.as_ref());

    if let Some(thread_id) = resume {
        resume_thread(&mut session, &mut transcript, &thread_id).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        render::prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" || input == "/exit" {
            break;
        }
        if input == "/new" {
            match session.start_new_session().await {
                Ok(thread_id) => {
                    transcript.set_thread_id(Some(thread_id.clone()));
                    println!("switched to new thread {thread_id}");
                }
                Err(error) => println!("error: {error}"),
            }
            continue;
        }
        if let Some(rest) = input.strip_prefix("/resume") {
            let thread_id = rest.trim();
            if thread_id.is_empty() {
                println!("usage: /resume <thread-id>");
                continue;
            }
            if let Err(error) = resume_thread(&mut session, &mut transcript, thread_id).await {
                println!("error: {error}");
            }
            continue;
        }

        transcript.append_local_user_message(input);
        let message = json!({"type": "human", "content": input});
        match session.stream_reply(vec![message], None).await {
            Ok(reply) => {
                if let Err(error) = drain_reply(reply, &mut transcript).await {
                    println!();
                    println!("error: {error}");
                }
            }
            Err(error) => println!("error: {error}"),
        }
    }

    Ok(())
}

async fn resume_thread(
    session: &mut ChatSession<ThreadServiceClient>,
    transcript: &mut TranscriptState,
    thread_id: &str,
) -> Result<()> {
    let history = session.resume_session(thread_id).await?;
    transcript.hydrate_history_if_empty(Some(thread_id.to_string()), &history);
    for line in render::transcript_lines(transcript.messages()) {
        println!("{line}");
    }
    println!("resumed thread {thread_id}");
    Ok(())
}

async fn drain_reply(mut reply: ReplyStream, transcript: &mut TranscriptState) -> Result<()> {
    let mut printer = render::StreamPrinter::new();
    for message in transcript.messages() {
        if message.role == SpeakerRole::Assistant {
            printer.mark_printed(&message.id, &message.text);
        }
    }
    while let Some(event) = reply.next_event().await? {
        let is_error = matches!(event, StreamEvent::StreamError { .. });
        transcript.apply_event(&event);
        if is_error {
            printer.finish_line();
            if let Some(message) = transcript.messages().last() {
                if message.role == SpeakerRole::System {
                    println!("stream error: {}", message.text);
                }
            }
            continue;
        }
        for message in transcript.messages() {
            if message.role == SpeakerRole::Assistant {
                printer.print_growth(&message.id, &message.text);
            }
        }
    }
    printer.finish_line();
    Ok(())
}
