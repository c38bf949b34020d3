use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc::Sender;

use super::{Gateway, GatewayError, Request, Response};

use crate::{
    device::{BaseSetup, CurrentUser, Device, ServiceConfig, User, UserDraft},
    export,
    notice::Notices,
    state::Event,
};

/// License issued for one station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub serial: String,
    pub license_key: String,
}

/// Operator commands. Each one reports its outcome through [Notices]
/// and never writes device state: the live channel reflects the outcome.
#[derive(Clone)]
pub struct Commands {
    gateway: Arc<Gateway>,
    notices: Notices,
    events: Option<Sender<Event>>,
}

impl Commands {
    pub fn new(gateway: Arc<Gateway>, notices: Notices) -> Self {
        Self {
            gateway,
            notices,
            events: None,
        }
    }

    /// Local confirmations are forwarded to the controller
    pub fn with_events(mut self, events: Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    async fn run(
        &self,
        request: Request,
        success: &str,
        failure: &str,
    ) -> Result<Response, GatewayError> {
        match self.gateway.execute(request).await {
            Ok(response) => {
                if !success.is_empty() {
                    self.notices.success(success);
                }
                Ok(response)
            },
            Err(e) => Err(self.reject(failure, e)),
        }
    }

    fn reject(&self, failure: &str, e: GatewayError) -> GatewayError {
        self.notices.failure(failure, &e);
        e
    }

    fn command(serial: &str, command: &str, payload: Value) -> Request {
        Request::post(format!("/api/devices/{}/command", serial))
            .with_body(json!({"command": command, "payload": payload}))
    }

    pub async fn reset(&self, serial: &str) -> Result<(), GatewayError> {
        self.run(
            Request::post(format!("/api/devices/{}/reset", serial)),
            "Reset command sent. The dashboard will update on its own.",
            "Could not send the reset command",
        )
        .await?;
        Ok(())
    }

    pub async fn lock(&self, serial: &str) -> Result<(), GatewayError> {
        self.run(
            Request::post(format!("/api/devices/{}/lock", serial)),
            "Lock command sent.",
            "Could not lock the station",
        )
        .await?;
        Ok(())
    }

    pub async fn unlock(&self, serial: &str) -> Result<(), GatewayError> {
        self.run(
            Request::post(format!("/api/devices/{}/unlock", serial)),
            "Unlock command sent.",
            "Could not unlock the station",
        )
        .await?;
        Ok(())
    }

    /// Requests a new license key for `serial`
    pub async fn generate_license(&self, serial: &str) -> Result<License, GatewayError> {
        let response = self
            .run(
                Request::post("/api/license/pi").with_body(json!({"serial": serial})),
                "License key generated.",
                "Could not generate a license key",
            )
            .await?;

        response
            .json::<License>()
            .map_err(|e| self.reject("Could not generate a license key", e))
    }

    /// Deploys `key` to `serial`, generating one first when none is given
    pub async fn license(&self, serial: &str, key: Option<&str>) -> Result<(), GatewayError> {
        let key = match key {
            Some(key) => key.to_string(),
            None => self.generate_license(serial).await?.license_key,
        };
        self.deploy_license(serial, &key).await
    }

    pub async fn deploy_license(&self, serial: &str, license_key: &str) -> Result<(), GatewayError> {
        let license_key = license_key.trim();
        if license_key.is_empty() {
            return Err(self.reject(
                "License deployment failed",
                GatewayError::Invalid("generate a license key first".to_string()),
            ));
        }

        self.run(
            Self::command(
                serial,
                "DEPLOY_LICENSE",
                json!({"license_key": license_key}),
            ),
            "License sent! Waiting for the station to reboot...",
            "License deployment failed",
        )
        .await?;
        Ok(())
    }

    pub async fn provision(&self, serial: &str, name: &str) -> Result<(), GatewayError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject(
                "Provisioning failed",
                GatewayError::Invalid("station name cannot be empty".to_string()),
            ));
        }

        self.run(
            Self::command(serial, "PROVISION_DEVICE", json!({"name": name})),
            "Provisioning command sent. The dashboard will update on its own.",
            "Provisioning failed",
        )
        .await?;
        Ok(())
    }

    /// Deploys a GNSS base setup, for the chip the station reported
    pub async fn configure_chip(&self, device: &Device, setup: &BaseSetup) -> Result<(), GatewayError> {
        if let Err(e) = setup.validate() {
            return Err(self.reject("GNSS configuration failed", GatewayError::Invalid(e)));
        }

        info!(
            "{}: {} base setup for {}",
            device.serial,
            setup.method(),
            device.chip_type()
        );

        let request = Request::post(format!("/api/devices/{}/configure-chip", device.serial))
            .with_body(json!({
                "command": "CONFIGURE_CHIP",
                "payload": setup.to_payload(device.chip_type()),
            }));

        self.run(
            request,
            "GNSS configuration sent. The dashboard will update on its own.",
            "GNSS configuration failed",
        )
        .await?;
        Ok(())
    }

    pub async fn configure_service(
        &self,
        serial: &str,
        config: &ServiceConfig,
    ) -> Result<(), GatewayError> {
        if let Err(e) = config.validate() {
            return Err(self.reject("Service configuration failed", GatewayError::Invalid(e)));
        }

        let payload =
            serde_json::to_value(config).map_err(|e| GatewayError::Invalid(e.to_string()))?;

        self.run(
            Self::command(serial, "DEPLOY_SERVICE_CONFIG", payload),
            "Service configuration sent. The dashboard will update on its own.",
            "Service configuration failed",
        )
        .await?;
        Ok(())
    }

    /// Removes `serial` from the list. This does not reset the station.
    pub async fn delete(&self, serial: &str) -> Result<(), GatewayError> {
        self.run(
            Request::delete(format!("/api/devices/{}", serial)),
            "",
            "Could not remove the station",
        )
        .await?;

        match &self.events {
            Some(events) => {
                let _ = events.send(Event::Removed(serial.to_string())).await;
            },
            None => {
                self.notices
                    .success(format!("Station {} removed from the list", serial));
            },
        }

        Ok(())
    }

    /// Lists stations, optionally restricted to one owner
    pub async fn load_devices(&self, user_id: Option<i64>) -> Result<Vec<Device>, GatewayError> {
        let path = match user_id {
            Some(user_id) => format!("/api/devices?user_id={}", user_id),
            None => "/api/devices".to_string(),
        };

        let response = self
            .run(Request::get(path), "", "Could not load stations")
            .await?;

        let devices = response
            .json::<Vec<Device>>()
            .map_err(|e| self.reject("Could not load stations", e))?;

        info!("loaded {} stations", devices.len());
        Ok(devices)
    }

    /// Authenticated operator. Any failure ends the session.
    pub async fn current_user(&self) -> Result<CurrentUser, GatewayError> {
        let user = match self.gateway.execute(Request::get("/api/auth/me")).await {
            Ok(response) => response.json::<CurrentUser>(),
            Err(e) => Err(e),
        };

        match user {
            Ok(user) => Ok(user),
            Err(e) => {
                if !e.is_unauthorized() {
                    self.notices.failure("Could not load the current user", &e);
                    self.gateway.end_session();
                }
                Err(e)
            },
        }
    }

    /// Downloads the CSV export into `dir`
    pub async fn export_csv(&self, user: &CurrentUser, dir: &Path) -> Result<PathBuf, GatewayError> {
        if !user.has_permission(CurrentUser::EXPORT_DATA) {
            return Err(self.reject(
                "Export failed",
                GatewayError::Invalid(format!(
                    "missing \"{}\" permission",
                    CurrentUser::EXPORT_DATA
                )),
            ));
        }

        let response = self
            .run(Request::get("/api/devices/export/csv"), "", "Export failed")
            .await?;

        let path = export::save(dir, self.gateway.now(), &response.body)
            .map_err(|e| self.reject("Export failed", e.into()))?;

        self.notices
            .success(format!("CSV file downloaded to {}", path.display()));

        Ok(path)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, GatewayError> {
        let response = self
            .run(Request::get("/api/users"), "", "Could not load users")
            .await?;

        response
            .json::<Vec<User>>()
            .map_err(|e| self.reject("Could not load users", e))
    }

    pub async fn create_user(&self, draft: &UserDraft) -> Result<User, GatewayError> {
        let body = serde_json::to_value(draft).map_err(|e| GatewayError::Invalid(e.to_string()))?;

        let response = self
            .run(
                Request::post("/api/users").with_body(body),
                "User created.",
                "Could not create user",
            )
            .await?;

        response
            .json::<User>()
            .map_err(|e| self.reject("Could not create user", e))
    }

    pub async fn update_user(&self, id: i64, draft: &UserDraft) -> Result<User, GatewayError> {
        let body = serde_json::to_value(draft).map_err(|e| GatewayError::Invalid(e.to_string()))?;

        let response = self
            .run(
                Request::put(format!("/api/users/{}", id)).with_body(body),
                "User updated.",
                "Could not update user",
            )
            .await?;

        response
            .json::<User>()
            .map_err(|e| self.reject("Could not update user", e))
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), GatewayError> {
        self.run(
            Request::delete(format!("/api/users/{}", id)),
            "User deleted.",
            "Could not delete user",
        )
        .await?;
        Ok(())
    }
}
