//! Typed slot surface
//!
//! Every slot the kiosk host exposes on its `backend` object, as typed
//! methods on [`BridgeClient`]. The string-keyed `call_slot` primitive stays
//! crate-internal; UI layers only ever go through these.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::{Error, Result};

use super::client::BridgeClient;

// Slot names on the host's backend object.
pub(crate) const PING: &str = "ping";
pub(crate) const OPEN_MENU: &str = "openMenu";
pub(crate) const GO_BACK: &str = "goBack";
pub(crate) const NAVIGATE_TO_HOME: &str = "navigateToHome";
pub(crate) const CHANGE_THEME: &str = "changeTheme";
pub(crate) const CHANGE_MODE: &str = "changeMode";
pub(crate) const UPDATE_PROGRESS: &str = "updateProgress";
pub(crate) const SEND_NOTIFICATION: &str = "sendNotification";
pub(crate) const LOG_ACTION: &str = "logAction";
pub(crate) const SHUTDOWN: &str = "shutdown";
pub(crate) const TEST_CLOSE_WINDOW: &str = "testCloseWindow";

/// Pseudo-slot under which connection handshakes are accounted in the call
/// log, mirroring how callers see `initialize()`.
pub(crate) const INITIALIZE: &str = "initialize";

/// Kiosk features the host can open full-screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Archives,
    Telephone,
    Reunions,
    Accueil,
    Commandes,
    Emails,
    Agenda,
    Colis,
}

impl Feature {
    /// Slot name the host exposes for this feature.
    pub fn slot(self) -> &'static str {
        match self {
            Feature::Archives => "openArchives",
            Feature::Telephone => "openTelephone",
            Feature::Reunions => "openReunions",
            Feature::Accueil => "openAccueil",
            Feature::Commandes => "openCommandes",
            Feature::Emails => "openEmails",
            Feature::Agenda => "openAgenda",
            Feature::Colis => "openColis",
        }
    }
}

impl BridgeClient {
    // === Navigation ===

    pub async fn open_menu(&self) -> Result<()> {
        self.call_slot(OPEN_MENU, Vec::new()).await.map(drop)
    }

    pub async fn go_back(&self) -> Result<()> {
        self.call_slot(GO_BACK, Vec::new()).await.map(drop)
    }

    pub async fn navigate_to_home(&self) -> Result<()> {
        self.call_slot(NAVIGATE_TO_HOME, Vec::new()).await.map(drop)
    }

    // === Features ===

    pub async fn open_feature(&self, feature: Feature) -> Result<()> {
        self.call_slot(feature.slot(), Vec::new()).await.map(drop)
    }

    // === Appearance ===

    pub async fn change_theme(&self, theme: &str) -> Result<()> {
        self.call_slot(CHANGE_THEME, vec![json!(theme)])
            .await
            .map(drop)
    }

    pub async fn change_mode(&self, mode: &str) -> Result<()> {
        self.call_slot(CHANGE_MODE, vec![json!(mode)])
            .await
            .map(drop)
    }

    /// Update the host progress bar. `value` is a percentage; anything above
    /// 100 is rejected locally, before any remote call.
    pub async fn update_progress(&self, value: u8) -> Result<()> {
        if value > 100 {
            return Err(Error::InvalidArgument(format!(
                "progress value {} out of range 0-100",
                value
            )));
        }
        self.call_slot(UPDATE_PROGRESS, vec![json!(value)])
            .await
            .map(drop)
    }

    // === System ===

    pub async fn send_notification(&self, message: &str) -> Result<()> {
        self.call_slot(SEND_NOTIFICATION, vec![json!(message)])
            .await
            .map(drop)
    }

    /// Record a user action in the host's telemetry log. The host expects the
    /// details pre-serialized as a JSON string.
    pub async fn log_action(&self, action: &str, details: &JsonValue) -> Result<()> {
        self.call_slot(LOG_ACTION, vec![json!(action), json!(details.to_string())])
            .await
            .map(drop)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.call_slot(SHUTDOWN, Vec::new()).await.map(drop)
    }

    pub async fn test_close_window(&self) -> Result<()> {
        self.call_slot(TEST_CLOSE_WINDOW, Vec::new()).await.map(drop)
    }

    /// Liveness probe; the health loop uses the same slot.
    pub async fn ping(&self) -> Result<()> {
        self.call_slot(PING, Vec::new()).await.map(drop)
    }

    /// End-to-end probe through the telemetry path. Maps any failure to
    /// `false` instead of an error; useful from diagnostics screens.
    pub async fn test_connection(&self) -> bool {
        match self
            .log_action("test_connection", &json!("Connection test"))
            .await
        {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "connection test failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_slot_names() {
        assert_eq!(Feature::Archives.slot(), "openArchives");
        assert_eq!(Feature::Telephone.slot(), "openTelephone");
        assert_eq!(Feature::Reunions.slot(), "openReunions");
        assert_eq!(Feature::Accueil.slot(), "openAccueil");
        assert_eq!(Feature::Commandes.slot(), "openCommandes");
        assert_eq!(Feature::Emails.slot(), "openEmails");
        assert_eq!(Feature::Agenda.slot(), "openAgenda");
        assert_eq!(Feature::Colis.slot(), "openColis");
    }

    #[tokio::test]
    async fn test_update_progress_rejects_out_of_range_locally() {
        // No transport at all: a range failure must surface before the
        // connection is ever touched.
        let client = BridgeClient::new(None);

        let result = client.update_progress(101).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(client.error_log().is_empty());

        // An in-range value does reach the connection path.
        let result = client.update_progress(57).await;
        assert!(matches!(result, Err(Error::TransportUnavailable)));
        client.dispose();
    }
}
