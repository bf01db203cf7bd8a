//! Firmware update adapter.
//!
//! Implements [`OtaPort`]: validate the commanded URL, then stream the
//! image over HTTPS into the inactive slot from a background thread and
//! reboot into it.  The wake-cycle task keeps the node awake (via the
//! extended OTA deadline) while the download runs.

use log::{info, warn};

use crate::app::ports::OtaPort;
use crate::config::URL_MAX;
use crate::error::OtaError;

/// A URL is acceptable when it is non-empty, fits the config bound and
/// carries an http(s) scheme.  Everything else on the command topic is
/// noise (or worse) and is refused before any network activity.
fn validate_url(url: &str) -> Result<(), OtaError> {
    if url.is_empty() || url.len() > URL_MAX {
        return Err(OtaError::InvalidUrl);
    }
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(OtaError::InvalidUrl);
    }
    Ok(())
}

pub struct OtaUpdater;

impl OtaUpdater {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OtaUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaPort for OtaUpdater {
    #[cfg(target_os = "espidf")]
    fn begin_update(&mut self, url: &str) -> Result<(), OtaError> {
        validate_url(url)?;
        let url: heapless::String<URL_MAX> =
            url.try_into().map_err(|()| OtaError::InvalidUrl)?;
        info!("starting firmware update from {url}");
        std::thread::Builder::new()
            .name("ota-update".into())
            .stack_size(8 * 1024)
            .spawn(move || {
                if let Err(e) = download_and_flash(&url) {
                    warn!("firmware update failed: {e}");
                }
                // Reboot either way: into the new image on success, or
                // back into this one to resume the sleep cycle.
                // SAFETY: esp_restart does not return.
                unsafe { esp_idf_svc::sys::esp_restart() }
            })
            .map_err(|_| OtaError::StartFailed)?;
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn begin_update(&mut self, url: &str) -> Result<(), OtaError> {
        validate_url(url)?;
        info!("sim: firmware update from {url}");
        Ok(())
    }
}

/// Stream the image into the inactive OTA slot and mark it bootable.
#[cfg(target_os = "espidf")]
fn download_and_flash(url: &str) -> Result<(), OtaError> {
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
    use esp_idf_svc::http::Method;

    let mut conn = EspHttpConnection::new(&Configuration {
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    })
    .map_err(|_| OtaError::UpdateFailed)?;
    conn.initiate_request(Method::Get, url, &[])
        .map_err(|_| OtaError::UpdateFailed)?;
    conn.initiate_response().map_err(|_| OtaError::UpdateFailed)?;
    if conn.status() != 200 {
        warn!("image fetch returned {}", conn.status());
        return Err(OtaError::UpdateFailed);
    }

    let mut update = esp_ota::OtaUpdate::begin().map_err(|_| OtaError::UpdateFailed)?;
    let mut buf = [0u8; 4096];
    let mut total = 0usize;
    loop {
        let n = conn.read(&mut buf).map_err(|_| OtaError::UpdateFailed)?;
        if n == 0 {
            break;
        }
        update.write(&buf[..n]).map_err(|_| OtaError::UpdateFailed)?;
        total += n;
    }
    info!("wrote {total} bytes to the inactive slot");
    let mut completed = update.finalize().map_err(|_| OtaError::UpdateFailed)?;
    completed
        .set_as_boot_partition()
        .map_err(|_| OtaError::UpdateFailed)?;
    Ok(())
}
