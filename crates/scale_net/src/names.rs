//! Command names, push contexts and reply texts.
//!
//! Controllers and the host both refer to these so the two sides cannot drift.

// ── Commands ────────────────────────────────────────────────────────────────

/// Write scales into the shared region. Args: `scales`, `overwrite = false`.
pub const SET_SCALES: &str = "SetScales";

/// Report the region handles and the game code.
pub const GET_GAME_SETTINGS: &str = "GetGameSettings";

/// Report the active character ids.
pub const GET_ACTIVE_CHARACTER_IDS: &str = "GetActiveCharacterIds";

/// Report every stored scale.
pub const GET_CURRENT_SCALES: &str = "GetCurrentScales";

/// Save or clear the persisted scales. Args: `clear = false`.
pub const UPDATE_PERSISTENCE: &str = "UpdatePersistence";

/// Every command the host answers.
pub const ALL_COMMANDS: [&str; 5] = [
    SET_SCALES,
    GET_GAME_SETTINGS,
    GET_ACTIVE_CHARACTER_IDS,
    GET_CURRENT_SCALES,
    UPDATE_PERSISTENCE,
];

// ── Push contexts ───────────────────────────────────────────────────────────

/// Context tag of the active-id change notification.
pub const ACTIVE_CHARACTER_CHANGE: &str = "ActiveCharacterChange";

// ── Socket transport ────────────────────────────────────────────────────────

/// HTTP path upgraded to the WebSocket transport.
pub const SOCKET_PATH: &str = "/socket";

// ── Reply texts ─────────────────────────────────────────────────────────────

/// `Message` values sent by the host.
pub mod messages {
    /// Generic success.
    pub const OK: &str = "OK";
    /// Success of `SetScales`.
    pub const SET_SCALES_OK: &str = "SetScales OK";
    /// The request could not be decoded or its name is malformed.
    pub const UNKNOWN_DATA_STRUCTURE: &str = "Unknown data structure!";
    /// No command is registered under the requested name.
    pub const UNKNOWN_COMMAND: &str = "Unknown command";
    /// The arguments did not bind to the command's parameters.
    pub const INVALID_PARAMETERS: &str = "Invalid parameters";
    /// The command ran but could not complete.
    pub const COMMAND_FAILED: &str = "Command failed";
    /// Push text for [`ACTIVE_CHARACTER_CHANGE`](super::ACTIVE_CHARACTER_CHANGE).
    pub const ACTIVE_CHARACTERS_CHANGED: &str = "Active characters changed";
}
