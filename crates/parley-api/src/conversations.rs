//! Thread resolution: finding or creating the conversation a message belongs
//! to, plus group membership.
//!
//! A thread's identity is its participant set (order-free, duplicate-free)
//! together with its name; one-to-one threads have no name. The store holds a
//! unique index over that identity, so two requests racing to create the same
//! thread end up with one row: the loser re-reads the winner and appends to it.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use parley_db::models::{ChatRow, MessageRow, NewChat, NewMessage};
use parley_db::{AddParticipantOutcome, ConversationStore, CredentialStore, participant_key};
use parley_types::api::ContactsAndGroups;
use parley_types::models::{Contact, ConversationThread, Message, ProfilePic};

use crate::error::{ServiceError, ServiceResult};

const DUPLICATE_GROUP: &str = "Group with same users and name already exists";

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub sender_id: Uuid,
    pub text: String,
}

/// Whether [`ConversationResolver::resolve_and_append`] reused a thread or made one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Appended,
    Created,
}

pub struct ConversationResolver<S> {
    store: Arc<S>,
}

impl<S: ConversationStore> ConversationResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Appends `message` to the thread identified by `participants` (and
    /// `name`, for more than two people), creating the thread on first use.
    ///
    /// Exactly two participants always address the one-to-one thread; any
    /// name supplied alongside them is ignored.
    pub fn resolve_and_append(
        &self,
        participants: &[Uuid],
        name: Option<&str>,
        message: IncomingMessage,
    ) -> ServiceResult<(ConversationThread, Resolution)> {
        let members = distinct(participants);
        if members.len() < 2 {
            return Err(ServiceError::validation(
                "A conversation needs at least two distinct users",
            ));
        }
        let name = match members.len() {
            2 => None,
            _ => Some(
                non_blank(name)
                    .ok_or_else(|| ServiceError::validation("Group conversations need a name"))?,
            ),
        };
        if message.sender_id.is_nil() {
            return Err(ServiceError::validation("Message needs a sender"));
        }
        if message.text.trim().is_empty() {
            return Err(ServiceError::validation("Message text must not be empty"));
        }

        let ids = to_strings(&members);
        let key = participant_key(&ids);
        let new_message = NewMessage {
            id: Uuid::new_v4().to_string(),
            sender_id: message.sender_id.to_string(),
            text: message.text,
            created_at: Utc::now().to_rfc3339(),
        };

        if let Some(existing) = self.store.find_chat(&key, name)? {
            let thread = self.append(&existing.id, &new_message)?;
            return Ok((thread, Resolution::Appended));
        }

        let chat = NewChat {
            id: Uuid::new_v4().to_string(),
            name: name.map(String::from),
            participants: ids,
            profile_pic: None,
            created_at: new_message.created_at.clone(),
        };

        if self.store.insert_chat(&chat, Some(&new_message))? {
            info!(chat_id = %chat.id, group = name.is_some(), "Conversation created");
            return Ok((self.load(&chat.id)?, Resolution::Created));
        }

        // Someone else created the same thread between our read and insert.
        debug!(participant_key = %key, "Lost thread creation race, appending to winner");
        let winner = self
            .store
            .find_chat(&key, name)?
            .ok_or_else(|| anyhow!("thread {} rejected as duplicate but not found", key))?;
        let thread = self.append(&winner.id, &new_message)?;
        Ok((thread, Resolution::Appended))
    }

    pub fn create_group(
        &self,
        name: &str,
        participants: &[Uuid],
        profile_pic: Option<ProfilePic>,
    ) -> ServiceResult<ConversationThread> {
        let members = distinct(participants);
        let Some(name) = non_blank(Some(name)) else {
            return Err(ServiceError::validation(
                "Group must have a name and at least 2 users",
            ));
        };
        if members.len() < 2 {
            return Err(ServiceError::validation(
                "Group must have a name and at least 2 users",
            ));
        }

        let ids = to_strings(&members);
        if self.store.find_chat(&participant_key(&ids), Some(name))?.is_some() {
            return Err(ServiceError::conflict(DUPLICATE_GROUP));
        }

        let chat = NewChat {
            id: Uuid::new_v4().to_string(),
            name: Some(name.to_string()),
            participants: ids,
            profile_pic: profile_pic.map(|p| (p.data, p.content_type)),
            created_at: Utc::now().to_rfc3339(),
        };
        if !self.store.insert_chat(&chat, None)? {
            return Err(ServiceError::conflict(DUPLICATE_GROUP));
        }

        info!(chat_id = %chat.id, members = chat.participants.len(), "Group created");
        self.load(&chat.id)
    }

    pub fn add_participant(&self, thread_id: Uuid, user_id: Uuid) -> ServiceResult<ConversationThread> {
        let chat_id = thread_id.to_string();
        match self.store.add_participant(&chat_id, &user_id.to_string())? {
            AddParticipantOutcome::Added => {
                info!(%chat_id, %user_id, "User added to group");
                self.load(&chat_id)
            }
            AddParticipantOutcome::ChatNotFound => Err(ServiceError::not_found("Group not found")),
            AddParticipantOutcome::AlreadyMember => {
                Err(ServiceError::conflict("User already in the group"))
            }
            AddParticipantOutcome::DirectChat => Err(ServiceError::validation(
                "Users cannot be added to a one-to-one conversation",
            )),
            AddParticipantOutcome::Collision => Err(ServiceError::conflict(DUPLICATE_GROUP)),
        }
    }

    pub fn get_thread(&self, thread_id: Uuid) -> ServiceResult<ConversationThread> {
        self.load(&thread_id.to_string())
    }

    /// The one-to-one thread between two users.
    pub fn find_direct(&self, a: Uuid, b: Uuid) -> ServiceResult<ConversationThread> {
        if a == b {
            return Err(ServiceError::validation("Provide two different users"));
        }
        let key = participant_key(&[a.to_string(), b.to_string()]);
        let row = self
            .store
            .find_chat(&key, None)?
            .ok_or_else(|| ServiceError::not_found("Chat not found"))?;
        Ok(thread_from_row(row)?)
    }

    /// Marks every message in the thread as read by `reader_id`.
    pub fn mark_read(&self, thread_id: Uuid, reader_id: Uuid) -> ServiceResult<ConversationThread> {
        let chat_id = thread_id.to_string();
        let thread = self.load(&chat_id)?;
        if !thread.participants.contains(&reader_id) {
            return Err(ServiceError::validation("Reader is not part of this conversation"));
        }

        self.store.mark_read(&chat_id, &reader_id.to_string())?;
        self.load(&chat_id)
    }

    fn append(&self, chat_id: &str, message: &NewMessage) -> ServiceResult<ConversationThread> {
        // Threads are never deleted, so a vanished thread is a store fault.
        self.store
            .append_message(chat_id, message)?
            .ok_or_else(|| anyhow!("thread {} disappeared while appending", chat_id))?;
        self.load(chat_id)
    }

    fn load(&self, chat_id: &str) -> ServiceResult<ConversationThread> {
        let row = self
            .store
            .get_chat(chat_id)?
            .ok_or_else(|| ServiceError::not_found("Chat not found"))?;
        Ok(thread_from_row(row)?)
    }
}

impl<S: ConversationStore + CredentialStore> ConversationResolver<S> {
    /// Everyone else as a contact, plus the named groups of three or more
    /// that `user_id` is in.
    pub fn contacts_and_groups(&self, user_id: Uuid) -> ServiceResult<ContactsAndGroups> {
        let id = user_id.to_string();

        let users = self
            .store
            .list_users_except(&id)?
            .into_iter()
            .map(|row| {
                Ok(Contact {
                    id: parse_id(&row.id)?,
                    username: row.username,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let groups = self
            .store
            .groups_for_user(&id)?
            .into_iter()
            .map(thread_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ContactsAndGroups { users, groups })
    }
}

/// Drops repeated ids, keeping first-seen order.
fn distinct(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn non_blank(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.trim().is_empty())
}

fn to_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

fn parse_id(raw: &str) -> anyhow::Result<Uuid> {
    raw.parse().map_err(|e| anyhow!("corrupt id '{}': {}", raw, e))
}

fn parse_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow!("corrupt timestamp '{}': {}", raw, e))?
        .with_timezone(&Utc))
}

fn message_from_row(row: MessageRow) -> anyhow::Result<Message> {
    Ok(Message {
        id: parse_id(&row.id)?,
        sender_id: parse_id(&row.sender_id)?,
        text: row.text,
        timestamp: parse_time(&row.created_at)?,
        read_by: row
            .read_by
            .iter()
            .map(|id| parse_id(id))
            .collect::<anyhow::Result<_>>()?,
    })
}

fn thread_from_row(row: ChatRow) -> anyhow::Result<ConversationThread> {
    Ok(ConversationThread {
        id: parse_id(&row.id)?,
        name: row.name,
        participants: row
            .participants
            .iter()
            .map(|id| parse_id(id))
            .collect::<anyhow::Result<_>>()?,
        profile_pic: row
            .profile_pic
            .map(|(data, content_type)| ProfilePic { content_type, data }),
        messages: row
            .messages
            .into_iter()
            .map(message_from_row)
            .collect::<anyhow::Result<_>>()?,
        created_at: parse_time(&row.created_at)?,
        updated_at: parse_time(&row.updated_at)?,
    })
}
