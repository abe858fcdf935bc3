use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use agrilink_net::{Direction, Query, Subscription};
use agrilink_shared::constants::{
    COLLECTION_CONVERSATIONS, COLLECTION_GROUP_MESSAGES, COLLECTION_MESSAGES,
    COLLECTION_PLANT_GROUPS,
};
use agrilink_shared::error::{AgrilinkError, Result};
use agrilink_shared::models::{ChatMessage, Conversation, GroupMessage, LastMessage, PlantGroup};

use crate::commands::decode_all;
use crate::state::AppContext;

const CHAT_IMAGE_PREFIX: &str = "chat-images";

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// Conversations the signed-in user takes part in, most recent first.
pub async fn conversations_for(ctx: &AppContext) -> Result<Vec<Conversation>> {
    let user = ctx.current_user()?;
    let docs = ctx.documents.query(&conversations_query(user.uid.as_str())).await?;
    Ok(decode_all(docs))
}

/// Messages of one conversation, newest first.
pub async fn messages_for(ctx: &AppContext, conversation_id: &str) -> Result<Vec<ChatMessage>> {
    let query = Query::collection(COLLECTION_MESSAGES)
        .where_eq("conversationId", conversation_id)
        .order_by("timestamp", Direction::Descending);
    let docs = ctx.documents.query(&query).await?;
    Ok(decode_all(docs))
}

/// Start a conversation, or return the existing one with the same members.
/// The signed-in user is always a participant.
pub async fn create_conversation(ctx: &AppContext, participants: &[String]) -> Result<String> {
    let user = ctx.current_user()?;
    let mut members: Vec<String> = participants.to_vec();
    members.push(user.uid.to_string());
    members.sort();
    members.dedup();

    let existing = ctx
        .documents
        .query(&conversations_query(user.uid.as_str()))
        .await?;
    let found = decode_all::<Conversation>(existing).into_iter().find(|c| {
        let mut theirs = c.participants.clone();
        theirs.sort();
        theirs == members
    });
    if let Some(conversation) = found {
        return Ok(conversation.id);
    }

    let now = Utc::now();
    let id = ctx
        .documents
        .add_document(
            COLLECTION_CONVERSATIONS,
            json!({
                "participants": members,
                "createdAt": now,
                "lastActive": now,
                "unreadCount": 0,
            }),
        )
        .await?;
    info!(conversation = %id, "Conversation created");
    Ok(id)
}

/// Post a message, uploading `image` first when given, and bump the
/// conversation's last message.
pub async fn send_message(
    ctx: &AppContext,
    conversation_id: &str,
    text: &str,
    image: Option<Bytes>,
) -> Result<ChatMessage> {
    let user = ctx.current_user()?;
    let conversation: Conversation = ctx
        .documents
        .get_document(COLLECTION_CONVERSATIONS, conversation_id)
        .await?
        .ok_or(AgrilinkError::NotFound)?
        .decode()?;

    let now = Utc::now();
    let image_url = match image {
        Some(bytes) => {
            let path = format!(
                "{CHAT_IMAGE_PREFIX}/{conversation_id}/{}",
                now.timestamp_millis()
            );
            Some(ctx.storage.upload(&path, bytes).await?)
        }
        None => None,
    };

    let mut message = ChatMessage {
        id: String::new(),
        text: text.to_string(),
        sender: user.uid.to_string(),
        timestamp: now,
        image: image_url,
        conversation_id: conversation_id.to_string(),
        read: false,
    };
    message.id = ctx
        .documents
        .add_document(COLLECTION_MESSAGES, serde_json::to_value(&message)?)
        .await?;

    let last = LastMessage {
        text: message.text.clone(),
        sender: message.sender.clone(),
        timestamp: now,
        read: false,
    };
    ctx.documents
        .update_document(
            COLLECTION_CONVERSATIONS,
            conversation_id,
            json!({
                "lastMessage": last,
                "lastActive": now,
                "unreadCount": conversation.unread_count + 1,
            }),
        )
        .await?;

    debug!(conversation = %conversation_id, message = %message.id, "Message sent");
    Ok(message)
}

/// Mark every unread message from the other participants as read.
/// Returns how many messages changed.
pub async fn mark_messages_read(ctx: &AppContext, conversation_id: &str) -> Result<usize> {
    let user = ctx.current_user()?;
    let query = Query::collection(COLLECTION_MESSAGES)
        .where_eq("conversationId", conversation_id)
        .where_eq("read", false)
        .where_not_eq("sender", user.uid.as_str());
    let unread = ctx.documents.query(&query).await?;

    for doc in &unread {
        ctx.documents
            .update_document(COLLECTION_MESSAGES, &doc.id, json!({ "read": true }))
            .await?;
    }
    if !unread.is_empty() {
        ctx.documents
            .update_document(
                COLLECTION_CONVERSATIONS,
                conversation_id,
                json!({ "unreadCount": 0 }),
            )
            .await?;
    }
    Ok(unread.len())
}

/// Live view of the signed-in user's conversations. The callback fires
/// with the current list and after every change until the handle drops.
pub fn watch_conversations<F>(ctx: &AppContext, on_change: F) -> Result<Subscription>
where
    F: Fn(Vec<Conversation>) + Send + Sync + 'static,
{
    let user = ctx.current_user()?;
    Ok(ctx.documents.subscribe(
        conversations_query(user.uid.as_str()),
        Box::new(move |docs| on_change(decode_all(docs))),
    ))
}

fn conversations_query(uid: &str) -> Query {
    Query::collection(COLLECTION_CONVERSATIONS)
        .where_array_contains("participants", uid)
        .order_by("lastActive", Direction::Descending)
}

// ---------------------------------------------------------------------------
// Plant groups
// ---------------------------------------------------------------------------

pub async fn join_group(ctx: &AppContext, group_id: &str) -> Result<PlantGroup> {
    let user = ctx.current_user()?;
    let mut group = load_group(ctx, group_id).await?;
    if group.has_member(&user.uid) {
        return Ok(group);
    }

    group.members.push(user.uid.to_string());
    save_members(ctx, &mut group).await?;
    info!(group = %group_id, user = %user.uid, "Joined group");
    Ok(group)
}

pub async fn leave_group(ctx: &AppContext, group_id: &str) -> Result<PlantGroup> {
    let user = ctx.current_user()?;
    let mut group = load_group(ctx, group_id).await?;
    if !group.has_member(&user.uid) {
        return Ok(group);
    }

    group.members.retain(|m| m != user.uid.as_str());
    save_members(ctx, &mut group).await?;
    info!(group = %group_id, user = %user.uid, "Left group");
    Ok(group)
}

pub async fn send_group_message(ctx: &AppContext, group_id: &str, text: &str) -> Result<GroupMessage> {
    let user = ctx.current_user()?;
    let now = Utc::now();
    let mut message = GroupMessage {
        id: String::new(),
        text: text.to_string(),
        sender: user.uid.to_string(),
        timestamp: now,
        group_id: group_id.to_string(),
        read: false,
    };
    message.id = ctx
        .documents
        .add_document(COLLECTION_GROUP_MESSAGES, serde_json::to_value(&message)?)
        .await?;

    ctx.documents
        .update_document(COLLECTION_PLANT_GROUPS, group_id, json!({ "lastActive": now }))
        .await?;
    Ok(message)
}

/// Messages posted to a group, newest first.
pub async fn group_messages(ctx: &AppContext, group_id: &str) -> Result<Vec<GroupMessage>> {
    let query = Query::collection(COLLECTION_GROUP_MESSAGES)
        .where_eq("groupId", group_id)
        .order_by("timestamp", Direction::Descending);
    let docs = ctx.documents.query(&query).await?;
    Ok(decode_all(docs))
}

async fn load_group(ctx: &AppContext, group_id: &str) -> Result<PlantGroup> {
    let doc = ctx
        .documents
        .get_document(COLLECTION_PLANT_GROUPS, group_id)
        .await?
        .ok_or(AgrilinkError::NotFound)?;
    Ok(doc.decode()?)
}

async fn save_members(ctx: &AppContext, group: &mut PlantGroup) -> Result<()> {
    group.member_count = group.members.len() as u32;
    group.last_active = Utc::now();
    ctx.documents
        .update_document(
            COLLECTION_PLANT_GROUPS,
            &group.id,
            json!({
                "members": group.members,
                "memberCount": group.member_count,
                "lastActive": group.last_active,
            }),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use agrilink_net::{AuthUser, ConnectivityMonitor, DocumentStore, MemoryBackend};
    use agrilink_shared::types::{GeoPoint, Reachability, UserId};
    use agrilink_store::Database;
    use chrono::{TimeZone, Utc};

    use crate::config::ClientConfig;
    use crate::device::FixedLocation;
    use crate::state::Backends;

    async fn setup(uid: &str) -> (MemoryBackend, Arc<AppContext>) {
        let backend = MemoryBackend::new();
        let ctx = AppContext::start(
            ClientConfig::default(),
            Database::open_in_memory().unwrap(),
            Backends::memory(&backend),
            ConnectivityMonitor::new(Reachability::Online),
            Arc::new(FixedLocation::new(GeoPoint::new(5.6, -0.2).unwrap())),
        )
        .await;
        sign_in(&backend, uid);
        (backend, ctx)
    }

    fn sign_in(backend: &MemoryBackend, uid: &str) {
        backend.sign_in_as(AuthUser {
            uid: UserId::new(uid),
            email: None,
            display_name: None,
            is_anonymous: false,
        });
    }

    #[tokio::test]
    async fn create_conversation_is_idempotent() {
        let (_backend, ctx) = setup("ama").await;

        let first = create_conversation(&ctx, &["kofi".into()]).await.unwrap();
        let again = create_conversation(&ctx, &["kofi".into(), "ama".into()]).await.unwrap();
        assert_eq!(first, again);

        let other = create_conversation(&ctx, &["esi".into()]).await.unwrap();
        assert_ne!(first, other);
        assert_eq!(conversations_for(&ctx).await.unwrap().len(), 2);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn send_message_uploads_image_and_updates_conversation() {
        let (backend, ctx) = setup("ama").await;
        let conversation = create_conversation(&ctx, &["kofi".into()]).await.unwrap();

        let sent = send_message(&ctx, &conversation, "See my leaves", Some(Bytes::from_static(b"jpg")))
            .await
            .unwrap();
        let url = sent.image.clone().unwrap();
        assert!(url.starts_with(&format!("memory://chat-images/{conversation}/")));

        let doc = backend
            .get_document(COLLECTION_CONVERSATIONS, &conversation)
            .await
            .unwrap()
            .unwrap();
        let updated: Conversation = doc.decode().unwrap();
        assert_eq!(updated.last_message.unwrap().text, "See my leaves");
        assert_eq!(updated.unread_count, 1);

        let messages = messages_for(&ctx, &conversation).await.unwrap();
        assert_eq!(messages, vec![sent]);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn send_to_missing_conversation_fails() {
        let (_backend, ctx) = setup("ama").await;
        assert!(matches!(
            send_message(&ctx, "nope", "hi", None).await,
            Err(AgrilinkError::NotFound)
        ));
        ctx.shutdown();
    }

    #[tokio::test]
    async fn messages_are_newest_first_and_marked_read() {
        let (backend, ctx) = setup("ama").await;
        let conversation = create_conversation(&ctx, &["kofi".into()]).await.unwrap();

        for (i, sender) in ["kofi", "ama", "kofi"].iter().enumerate() {
            let message = ChatMessage {
                id: String::new(),
                text: format!("m{i}"),
                sender: sender.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, i as u32).unwrap(),
                image: None,
                conversation_id: conversation.clone(),
                read: false,
            };
            backend
                .add_document(COLLECTION_MESSAGES, serde_json::to_value(&message).unwrap())
                .await
                .unwrap();
        }

        let texts: Vec<_> = messages_for(&ctx, &conversation)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m2", "m1", "m0"]);

        assert_eq!(mark_messages_read(&ctx, &conversation).await.unwrap(), 2);
        assert_eq!(mark_messages_read(&ctx, &conversation).await.unwrap(), 0);
        let unread_mine = messages_for(&ctx, &conversation)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| !m.read)
            .count();
        assert_eq!(unread_mine, 1);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn watch_conversations_follows_changes() {
        let (backend, ctx) = setup("ama").await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let sub = watch_conversations(&ctx, move |list| {
            sink.lock().unwrap().push(list.len());
        })
        .unwrap();
        create_conversation(&ctx, &["kofi".into()]).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);

        drop(sub);
        assert_eq!(backend.listener_count(), 0);
        create_conversation(&ctx, &["esi".into()]).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
        ctx.shutdown();
    }

    #[tokio::test]
    async fn join_and_leave_keep_member_count() {
        let (backend, ctx) = setup("ama").await;
        let now = Utc::now();
        backend
            .set_document(
                COLLECTION_PLANT_GROUPS,
                "cassava",
                json!({
                    "name": "Cassava growers",
                    "plantType": "cassava",
                    "members": ["kofi"],
                    "memberCount": 1,
                    "createdAt": now,
                    "lastActive": now,
                }),
            )
            .await
            .unwrap();

        let joined = join_group(&ctx, "cassava").await.unwrap();
        assert_eq!(joined.member_count, 2);
        let twice = join_group(&ctx, "cassava").await.unwrap();
        assert_eq!(twice.member_count, 2);

        let left = leave_group(&ctx, "cassava").await.unwrap();
        assert_eq!(left.members, vec!["kofi".to_string()]);
        let doc = backend
            .get_document(COLLECTION_PLANT_GROUPS, "cassava")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.data["memberCount"], 1);

        assert!(matches!(
            join_group(&ctx, "missing").await,
            Err(AgrilinkError::NotFound)
        ));
        ctx.shutdown();
    }

    #[tokio::test]
    async fn group_messages_touch_group_activity() {
        let (backend, ctx) = setup("ama").await;
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        backend
            .set_document(
                COLLECTION_PLANT_GROUPS,
                "rice",
                json!({
                    "name": "Rice",
                    "plantType": "rice",
                    "createdAt": created,
                    "lastActive": created,
                }),
            )
            .await
            .unwrap();

        let sent = send_group_message(&ctx, "rice", "Planting next week").await.unwrap();
        assert_eq!(group_messages(&ctx, "rice").await.unwrap(), vec![sent]);

        let group = load_group(&ctx, "rice").await.unwrap();
        assert!(group.last_active > created);
        ctx.shutdown();
    }
}
