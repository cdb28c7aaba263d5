use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{SeatEntity, TimerEntity, TimerKind};

/// On-disk shape of a timer aggregate: header fields plus embedded seat rows,
/// so the whole aggregate is replaced atomically in one document write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTimerDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    kind: TimerKind,
    creator_id: Uuid,
    initial_duration_ms: u64,
    reload_increment_ms: Option<u64>,
    current_seat: usize,
    board_game_id: Option<Uuid>,
    event_id: Option<Uuid>,
    created_at: DateTime,
    updated_at: DateTime,
    seats: Vec<SeatEntity>,
}

impl From<TimerEntity> for MongoTimerDocument {
    fn from(value: TimerEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            creator_id: value.creator_id,
            initial_duration_ms: value.initial_duration_ms,
            reload_increment_ms: value.reload_increment_ms,
            current_seat: value.current_seat,
            board_game_id: value.board_game_id,
            event_id: value.event_id,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            seats: value.seats,
        }
    }
}

impl From<MongoTimerDocument> for TimerEntity {
    fn from(value: MongoTimerDocument) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            creator_id: value.creator_id,
            initial_duration_ms: value.initial_duration_ms,
            reload_increment_ms: value.reload_increment_ms,
            current_seat: value.current_seat,
            board_game_id: value.board_game_id,
            event_id: value.event_id,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            seats: value.seats,
        }
    }
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

/// Query document selecting a timer by primary key.
pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
