//! Scale commands — the operations a controller can run against the host.
//!
//! Commands (names in [`scale_net::names`]):
//!
//!   SetScales              — write scales; args `scales`, `overwrite = false`
//!   GetGameSettings        — region handles and game code
//!   GetActiveCharacterIds  — ids currently on screen
//!   GetCurrentScales       — every stored scale
//!   UpdatePersistence      — save scales, or delete the file with `clear = true`
//!
//!   Push:
//!     ActiveCharacterChange — sorted active ids, sent when the set changes

use serde::Serialize;
use tracing::{info, warn};

use scale_net::names::{self, messages};
use scale_net::{Response, ScaleEntry};
use scale_region::ScaleStore;

use crate::persistence::ScalePersistence;
use crate::push::PushSender;
use crate::registry::{CommandRegistry, Param};

/// Command target owned by the host thread.
#[derive(Debug)]
pub struct ScaleHost {
    store: ScaleStore,
    persistence: ScalePersistence,
    game: String,
}

// ---------------------------------------------------------------------------
// Reply payloads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GameSettings<'a> {
    scale_address: i64,
    char_list: i64,
    game: &'a str,
}

#[derive(Serialize)]
struct ActiveIds<'a> {
    ids: &'a [u32],
}

#[derive(Serialize)]
struct CurrentScales {
    scales: Vec<ScaleEntry>,
}

fn with_payload<P: Serialize>(message: &str, payload: &P) -> Response {
    match serde_json::to_value(payload) {
        Ok(data) => Response::success(message).with_data(data),
        Err(err) => {
            warn!(%err, "failed to encode reply payload");
            Response::exception(messages::COMMAND_FAILED)
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

impl ScaleHost {
    /// Create the host and pre-populate the scale table from `persistence`.
    #[must_use]
    pub fn new(mut store: ScaleStore, persistence: ScalePersistence, game: impl Into<String>) -> Self {
        if let Some(scales) = persistence.load() {
            match store.write_scales(scales, true) {
                Ok(count) => info!(count, "restored persisted scales"),
                Err(err) => warn!(%err, "persisted scales not restored"),
            }
        }
        Self {
            store,
            persistence,
            game: game.into(),
        }
    }

    /// Returns the scale store.
    #[must_use]
    pub fn store(&self) -> &ScaleStore {
        &self.store
    }

    /// Returns the scale store for producer writes on the host thread.
    pub fn store_mut(&mut self) -> &mut ScaleStore {
        &mut self.store
    }

    /// Returns the game code reported by `GetGameSettings`.
    #[must_use]
    pub fn game(&self) -> &str {
        &self.game
    }

    /// Send an `ActiveCharacterChange` push through `push` whenever the
    /// active-id set changes.
    pub fn forward_active_changes(&mut self, push: PushSender) {
        self.store.on_active_change(move |ids| {
            if !push.active_characters_changed(ids) {
                warn!("push channel closed, active change not sent");
            }
        });
    }

    // ── Commands ────────────────────────────────────────────────────────────

    /// `SetScales`.
    pub fn set_scales(&mut self, scales: Vec<ScaleEntry>, overwrite: bool) -> Option<Response> {
        let entries = scales.into_iter().map(|e| (e.id, e.scale));
        match self.store.write_scales(entries, overwrite) {
            Ok(_) => Some(Response::success(messages::SET_SCALES_OK)),
            Err(err) => {
                warn!(%err, "SetScales failed");
                Some(Response::exception(messages::COMMAND_FAILED))
            }
        }
    }

    /// `GetGameSettings`.
    #[must_use]
    pub fn game_settings(&self) -> Option<Response> {
        let region = self.store.region();
        let payload = GameSettings {
            scale_address: region.scale_handle(),
            char_list: region.active_handle(),
            game: &self.game,
        };
        Some(with_payload(messages::OK, &payload))
    }

    /// `GetActiveCharacterIds`.
    pub fn active_character_ids(&mut self) -> Option<Response> {
        let ids = self.store.read_active_ids();
        Some(with_payload(messages::OK, &ActiveIds { ids }))
    }

    /// `GetCurrentScales`.
    #[must_use]
    pub fn current_scales(&self) -> Option<Response> {
        let scales = self
            .store
            .read_scales()
            .into_iter()
            .map(|(id, scale)| ScaleEntry { id, scale })
            .collect();
        Some(with_payload(messages::OK, &CurrentScales { scales }))
    }

    /// `UpdatePersistence`.
    pub fn update_persistence(&mut self, clear: bool) -> Option<Response> {
        let result = if clear {
            self.persistence.save(None)
        } else {
            self.persistence.save(Some(&self.store.read_scales()))
        };
        match result {
            Ok(()) => Some(Response::success(messages::OK)),
            Err(err) => {
                warn!(%err, clear, "UpdatePersistence failed");
                Some(Response::exception(messages::COMMAND_FAILED))
            }
        }
    }

    // ── Registration ────────────────────────────────────────────────────────

    /// Register every scale command in `registry`.
    pub fn register_commands(registry: &mut CommandRegistry<Self>) {
        registry.register(
            names::SET_SCALES,
            vec![
                Param::required::<Vec<ScaleEntry>>("scales"),
                Param::with_default("overwrite", false),
            ],
            |host: &mut Self, mut args| {
                let scales = args.take("scales")?;
                let overwrite = args.take("overwrite")?;
                host.set_scales(scales, overwrite)
            },
        );
        registry.register(names::GET_GAME_SETTINGS, Vec::new(), |host: &mut Self, _| {
            host.game_settings()
        });
        registry.register(
            names::GET_ACTIVE_CHARACTER_IDS,
            Vec::new(),
            |host: &mut Self, _| host.active_character_ids(),
        );
        registry.register(names::GET_CURRENT_SCALES, Vec::new(), |host: &mut Self, _| {
            host.current_scales()
        });
        registry.register(
            names::UPDATE_PERSISTENCE,
            vec![Param::with_default("clear", false)],
            |host: &mut Self, mut args| {
                let clear = args.take("clear")?;
                host.update_persistence(clear)
            },
        );
    }

    /// A registry holding exactly the scale commands.
    #[must_use]
    pub fn command_registry() -> CommandRegistry<Self> {
        let mut registry = CommandRegistry::new();
        Self::register_commands(&mut registry);
        registry
    }
}
