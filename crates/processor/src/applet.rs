//! Applet installation
//!
//! Replaces the token applet through a secure channel with the card
//! manager: delete the old instance and package, load the new package in
//! blocks, install it and select the new instance. A failure after the
//! delete leaves the token without an applet; running format again
//! recovers it.

use std::fs;
use std::ops::Range;
use std::path::Path;

use tps_apdu_core::transport::TransportError;
use tps_globalplatform::SecureChannel;
use tracing::{debug, info, instrument};

use crate::channel::{ChannelFactory, select};
use crate::config::OperationConfig;
use crate::context::OperationContext;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::registry::TokenRecord;
use crate::session::SessionTransport;

/// Applet version to install and where its file lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppletTarget<'a> {
    /// Required version; also the file stem
    pub version: &'a str,
    /// Directory holding `<version>.<ext>`
    pub directory: &'a str,
}

/// Installs applet packages on the token
#[derive(Debug, Clone, Copy)]
pub struct AppletInstaller<'a> {
    channels: ChannelFactory<'a>,
    op: &'a OperationConfig,
}

impl<'a> AppletInstaller<'a> {
    /// Installer opening channels with `channels`
    pub const fn new(channels: ChannelFactory<'a>, op: &'a OperationConfig) -> Self {
        Self { channels, op }
    }

    /// Bring the applet to `target.version`
    ///
    /// Nothing is sent when `current` already matches. Otherwise returns the
    /// authenticated channel used for the install so callers can reuse it.
    #[instrument(skip_all, fields(cuid = %record.id, required = target.version))]
    pub fn upgrade(
        &self,
        transport: &mut SessionTransport,
        ctx: &OperationContext,
        current: Option<&str>,
        target: AppletTarget<'_>,
        record: &mut TokenRecord,
        progress: Range<u8>,
    ) -> Result<Option<SecureChannel>> {
        if current.is_some_and(|v| v.eq_ignore_ascii_case(target.version)) {
            debug!("Applet already at the required version");
            return Ok(None);
        }

        let path = Path::new(target.directory).join(format!("{}.{}", target.version, self.op.applet_ext));
        let package = fs::read(&path)
            .or_kind(ErrorKind::Upgrade, format!("unable to read applet file {}", path.display()))?;
        info!(current = current.unwrap_or("none"), file = %path.display(), bytes = package.len(), "Upgrading applet");

        select(transport, &self.op.card_manager_aid)
            .map_err(|e| Error::card(ErrorKind::Upgrade, "select card manager", e))?;
        let mut channel = self.channels.open_default(transport)?;

        let card = |context: &'static str| {
            move |e: tps_globalplatform::Error| Error::card(ErrorKind::Upgrade, context, e)
        };

        channel
            .delete_file(transport, &self.op.applet_aid)
            .map_err(card("delete applet"))?;
        channel
            .delete_file(transport, &self.op.package_aid)
            .map_err(card("delete package"))?;
        channel
            .install_load(transport, &self.op.package_aid, &[], package.len())
            .map_err(card("install for load"))?;

        let updates = ctx.status_updates();
        channel
            .load_file::<_, tps_globalplatform::Error>(
                transport,
                &package,
                self.op.block_size,
                progress,
                |t, percent| {
                    if updates {
                        t.status_update(percent, "PROGRESS_APPLET_BLOCK")
                            .map_err(|e| TransportError::session(e.to_string()))?;
                    }
                    Ok(())
                },
            )
            .map_err(card("load"))?;

        channel
            .install_applet(
                transport,
                &self.op.package_aid,
                &self.op.applet_aid,
                0,
                self.op.instance_size,
                self.op.applet_memory_size,
            )
            .map_err(card("install applet"))?;

        select(transport, &self.op.applet_aid)
            .map_err(card("select new applet"))?;

        record.applet_id = Some(target.version.to_owned());
        info!(version = target.version, "Applet upgraded");
        Ok(Some(channel))
    }
}
