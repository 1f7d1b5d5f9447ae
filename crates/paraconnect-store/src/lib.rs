//! # paraconnect-store
//!
//! Local persistence for the ParaConnect client, backed by SQLite.
//!
//! The only state that must survive a restart is the attachment staging
//! queue: files a user attached to a case message but has not sent yet.
//! The workspace talks to it through the [`AttachmentStore`] trait so a
//! caller can swap the SQLite file for the in-memory store.

pub mod attachments;
pub mod database;
pub mod migrations;
pub mod models;

mod error;

pub use attachments::{AttachmentStore, MemoryAttachmentStore};
pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
