//! WebSocket gateway: per-connection lifecycle and command dispatch.
//!
//! Every inbound frame is answered with a typed [`CommandReply`]; a malformed
//! frame earns a `validation_failed` reply, never a dropped connection.
//! Role checks happen here against the hub's connection bindings, and the
//! lifecycle checks happen in the state machine, so neither can be bypassed.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        question::{HostQuestionView, ParticipantQuestionView},
        session::{CreateSessionRequest, SessionDetails},
        ws::{AnswerSummary, ClientCommand, CommandReply, ReplyData},
    },
    error::{ErrorCode, ServiceError},
    services::{answer_service, participant_service, session_service, supervisor},
    state::{
        SharedState,
        hub::{ClientConnection, ConnectionRole},
        machine::{Actor, SessionPhase},
        session::Session,
    },
};

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    state.hub().register(ClientConnection {
        id: connection_id,
        tx: outbound_tx.clone(),
    });
    info!(connection_id = %connection_id, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        let name = command.name();
                        match dispatch(&state, connection_id, command).await {
                            Ok(data) => CommandReply::ok(name, data),
                            Err(err) => {
                                debug!(
                                    connection_id = %connection_id,
                                    command = name,
                                    error = %err,
                                    "command rejected"
                                );
                                CommandReply::fail(name, err.code())
                            }
                        }
                    }
                    Err(err) => {
                        warn!(connection_id = %connection_id, error = %err, "unparseable command");
                        CommandReply::fail("unknown", ErrorCode::ValidationFailed)
                    }
                };
                send_reply(&outbound_tx, &reply);
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection_id = %connection_id, "client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection_id = %connection_id, error = %err, "websocket error");
                break;
            }
        }
    }

    supervisor::connection_closed(&state, connection_id).await;
    info!(connection_id = %connection_id, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Route one command to its service, enforcing the caller's role first.
async fn dispatch(
    state: &SharedState,
    connection_id: Uuid,
    command: ClientCommand,
) -> Result<ReplyData, ServiceError> {
    match command {
        ClientCommand::CreateSession {
            quiz_id,
            title,
            host_token,
            question_time_limit_seconds,
        } => {
            let host_id = resolve_identity(state, &host_token)?;
            let session = session_service::create_session(
                state,
                host_id,
                Some(connection_id),
                CreateSessionRequest {
                    quiz_id,
                    title,
                    question_time_limit_seconds,
                },
            )
            .await?;
            state.hub().bind_host(session.id, connection_id);
            Ok(ReplyData::SessionCreated {
                session: (&session).into(),
            })
        }
        ClientCommand::ResumeHost {
            session_id,
            host_token,
        } => {
            let host_id = resolve_identity(state, &host_token)?;
            let session =
                session_service::resume_host(state, session_id, &host_id, connection_id).await?;
            Ok(ReplyData::HostResumed {
                current_question: host_question_view(&session),
                session: SessionDetails::from(&session),
            })
        }
        ClientCommand::StartGame { session_id } => {
            require_host(state, connection_id, session_id)?;
            let session = session_service::start_game(state, session_id).await?;
            let question = host_question_view(&session).ok_or(ServiceError::SessionNotActive)?;
            Ok(ReplyData::QuestionAdvanced { question })
        }
        ClientCommand::NextQuestion {
            session_id,
            question_index,
        } => {
            require_host(state, connection_id, session_id)?;
            match session_service::next_question(state, session_id, question_index).await? {
                session_service::AdvanceOutcome::Advanced(session) => {
                    let question =
                        host_question_view(&session).ok_or(ServiceError::SessionNotActive)?;
                    Ok(ReplyData::QuestionAdvanced { question })
                }
                session_service::AdvanceOutcome::Ended(session) => Ok(ReplyData::Ended {
                    leaderboard: session.leaderboard(),
                }),
            }
        }
        ClientCommand::EndSession { session_id } => {
            require_host(state, connection_id, session_id)?;
            let session = session_service::end_session(state, session_id, Actor::Host).await?;
            Ok(ReplyData::Ended {
                leaderboard: session.leaderboard(),
            })
        }
        ClientCommand::RemovePlayer {
            session_id,
            participant_id,
        } => {
            require_host(state, connection_id, session_id)?;
            let participant =
                participant_service::remove_player(state, session_id, participant_id).await?;
            Ok(ReplyData::Removed {
                participant_id: participant.id,
            })
        }
        ClientCommand::UnbanPlayer {
            session_id,
            display_name,
        } => {
            require_host(state, connection_id, session_id)?;
            let lifted =
                participant_service::unban_player(state, session_id, &display_name).await?;
            Ok(ReplyData::Unbanned { lifted })
        }
        ClientCommand::JoinSession {
            join_code,
            display_name,
        } => {
            let (session, participant) =
                participant_service::join(state, &join_code, &display_name, connection_id).await?;
            Ok(ReplyData::Joined {
                current_question: participant_question_view(&session),
                participant: (&participant).into(),
                session: SessionDetails::from(&session),
            })
        }
        ClientCommand::SubmitAnswer {
            session_id,
            question_index,
            selected_answer,
        } => {
            let participant_id = require_participant(state, connection_id, session_id)?;
            let record = answer_service::submit_answer(
                state,
                session_id,
                participant_id,
                question_index,
                &selected_answer,
            )
            .await?;
            Ok(ReplyData::AnswerRecorded {
                answer: AnswerSummary::from(&record),
            })
        }
        ClientCommand::LeaveSession { session_id } => {
            let participant_id = require_participant(state, connection_id, session_id)?;
            participant_service::leave(state, session_id, participant_id, connection_id).await?;
            Ok(ReplyData::Ack)
        }
        ClientCommand::Unknown => Err(ServiceError::ValidationFailed(
            "unrecognized command".into(),
        )),
    }
}

/// Resolve the host's bearer token through the identity provider.
fn resolve_identity(state: &SharedState, token: &str) -> Result<String, ServiceError> {
    state
        .identity()
        .resolve(token)
        .ok_or_else(|| ServiceError::Unauthorized("unresolvable host token".into()))
}

/// A privileged command is honored only when the hub's role-binding table
/// maps the session to this very connection. Stale connections (from before
/// a reconnect) fail here and must go through `resume_host` again.
fn require_host(
    state: &SharedState,
    connection_id: Uuid,
    session_id: Uuid,
) -> Result<(), ServiceError> {
    if state.hub().host_connection(session_id) == Some(connection_id) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "connection is not the session's host".into(),
        ))
    }
}

/// Participant commands require the connection's bound participant role for
/// the targeted session.
fn require_participant(
    state: &SharedState,
    connection_id: Uuid,
    session_id: Uuid,
) -> Result<Uuid, ServiceError> {
    match state.hub().role(connection_id) {
        Some(ConnectionRole::Participant {
            session_id: bound,
            participant_id,
        }) if bound == session_id => Ok(participant_id),
        _ => Err(ServiceError::Unauthorized(
            "connection has not joined this session".into(),
        )),
    }
}

fn host_question_view(session: &Session) -> Option<HostQuestionView> {
    let index = session.current_question_index?;
    let question = session.current_question.as_ref()?;
    Some(HostQuestionView::build(
        index,
        question,
        session.question_time_limit_secs,
    ))
}

fn participant_question_view(session: &Session) -> Option<ParticipantQuestionView> {
    if session.phase != SessionPhase::Active {
        return None;
    }
    let index = session.current_question_index?;
    let question = session.current_question.as_ref()?;
    Some(ParticipantQuestionView::build(
        index,
        question,
        session.question_time_limit_secs,
    ))
}

/// Serialize a reply and push it onto the connection's writer channel.
fn send_reply(tx: &mpsc::UnboundedSender<Message>, reply: &CommandReply) {
    match serde_json::to_string(reply) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => {
            warn!(error = %err, "failed to serialize command reply");
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
