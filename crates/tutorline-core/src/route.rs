//! Role-dependent routing of inbound sends.
//!
//! Teachers post straight into a room they name. Students address a
//! counterpart by user id and the room is resolved (or created) on their
//! behalf. Supervisors only read.

use thiserror::Error;
use tutorline_protocol::{ClientFrame, ErrorCode, Role, RoomId, UserId};

use crate::connection::Identity;

/// Why a send was refused before touching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("room_id is required")]
    MissingRoom,

    #[error("target_user_id is required")]
    MissingTarget,

    #[error("cannot send a message to yourself")]
    SelfTarget,

    #[error("message content is empty")]
    EmptyContent,

    #[error("message content exceeds {max} characters")]
    ContentTooLong { max: usize },

    #[error("role {0} cannot send messages")]
    ReadOnly(Role),
}

impl RouteError {
    /// Wire code reported to the client.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            RouteError::MissingRoom => ErrorCode::MissingRoom,
            RouteError::MissingTarget => ErrorCode::MissingTarget,
            RouteError::SelfTarget => ErrorCode::SelfTarget,
            RouteError::EmptyContent => ErrorCode::EmptyContent,
            RouteError::ContentTooLong { .. } => ErrorCode::ContentTooLong,
            RouteError::ReadOnly(_) => ErrorCode::ReadOnly,
        }
    }
}

/// How a send reaches its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRoute {
    /// The sender names the room.
    Direct { room_id: RoomId },
    /// The room is the two-party room shared with `target_user_id`.
    ResolveThenSend { target_user_id: UserId },
}

/// An inbound `send` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub room_id: Option<RoomId>,
    pub target_user_id: Option<UserId>,
    pub content: String,
}

impl SendRequest {
    /// Extract a send request from a client frame.
    #[must_use]
    pub fn from_frame(frame: ClientFrame) -> Option<Self> {
        match frame {
            ClientFrame::Send {
                room_id,
                target_user_id,
                content,
            } => Some(Self {
                room_id,
                target_user_id,
                content,
            }),
            ClientFrame::Ping { .. } => None,
        }
    }

    /// Pick the route for `sender`.
    ///
    /// `max_content_length` counts characters, not bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] if the sender's role cannot send, the frame
    /// lacks the address the role needs, or the content is empty or too long.
    pub fn route(
        &self,
        sender: Identity,
        max_content_length: usize,
    ) -> Result<SendRoute, RouteError> {
        let route = match sender.role {
            Role::Teacher => SendRoute::Direct {
                room_id: self.room_id.ok_or(RouteError::MissingRoom)?,
            },
            Role::Student => {
                let target_user_id = self.target_user_id.ok_or(RouteError::MissingTarget)?;
                if target_user_id == sender.user_id {
                    return Err(RouteError::SelfTarget);
                }
                SendRoute::ResolveThenSend { target_user_id }
            }
            Role::Supervisor => return Err(RouteError::ReadOnly(sender.role)),
        };

        if self.content.trim().is_empty() {
            return Err(RouteError::EmptyContent);
        }
        if self.content.chars().count() > max_content_length {
            return Err(RouteError::ContentTooLong {
                max: max_content_length,
            });
        }

        Ok(route)
    }
}
