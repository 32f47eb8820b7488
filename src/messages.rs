use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::html_to_text;
use crate::store::Store;

/// A note for the admin panel, stored already rendered.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Message {
    pub id: u64,
    pub kind: String,
    pub data: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

/// Events the admin is told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Comment {
        author: String,
        post_title: String,
        content: String,
    },
    Reply {
        author: String,
        parent_author: String,
        post_title: String,
        content: String,
    },
}

impl Notice {
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::Comment { .. } => "comment",
            Notice::Reply { .. } => "reply",
        }
    }

    pub fn render(&self) -> String {
        match self {
            Notice::Comment {
                author,
                post_title,
                content,
            } => format!(
                "<p>{author} commented on post <i>{post_title}</i>: </p><p>{}</p>",
                html_to_text(content)
            ),
            Notice::Reply {
                author,
                parent_author,
                post_title,
                content,
            } => format!(
                "<p>{author} replied {parent_author}'s comment on <i>{post_title}</i>: </p><p>{}</p>",
                html_to_text(content)
            ),
        }
    }

    pub fn to_message(&self) -> Message {
        Message {
            id: 0,
            kind: self.kind().to_string(),
            data: self.render(),
            is_read: false,
            created_at: Utc::now().naive_utc(),
        }
    }
}

pub fn record_notice<S: Store + ?Sized>(store: &mut S, notice: &Notice) -> Result<Message> {
    let mut message = notice.to_message();
    message.id = store.insert_message(&message)?;
    Ok(message)
}

/// Newest unread messages, at most `limit`.
pub fn unread_messages<S: Store + ?Sized>(store: &mut S, limit: u64) -> Result<Vec<Message>> {
    store.unread_messages(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;
    use crate::store::Database;

    #[test]
    fn comment_notice_strips_markup() {
        let notice = Notice::Comment {
            author: "Ann".to_string(),
            post_title: "Hello".to_string(),
            content: "<script>x</script><b>nice</b> post".to_string(),
        };
        assert_eq!(notice.kind(), "comment");
        assert_eq!(
            notice.render(),
            "<p>Ann commented on post <i>Hello</i>: </p><p>x nice post</p>"
        );
    }

    #[test]
    fn reply_notice_names_parent() {
        let notice = Notice::Reply {
            author: "Bob".to_string(),
            parent_author: "Ann".to_string(),
            post_title: "Hello".to_string(),
            content: "agreed".to_string(),
        };
        assert_eq!(notice.kind(), "reply");
        assert!(notice.render().starts_with("<p>Bob replied Ann's comment on <i>Hello</i>"));
    }

    #[test]
    fn unread_is_newest_first_and_limited() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().unwrap();
        for i in 0..3 {
            let notice = Notice::Comment {
                author: format!("a{i}"),
                post_title: "t".to_string(),
                content: "c".to_string(),
            };
            record_notice(&mut tx, &notice).unwrap();
        }
        let unread = unread_messages(&mut tx, 2).unwrap();
        assert_eq!(unread.len(), 2);
        assert!(unread[0].data.starts_with("<p>a2"));
    }
}
