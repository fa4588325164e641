//! The three commands: export from the source org, import into and purge the
//! destination org.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::cancel::CancelSignal;
use crate::client::PortalClient;
use crate::config::Config;
use crate::error::{PortalError, Result};
use crate::exporter::{ExportReport, PortalExporter};
use crate::storage::ExportLayout;

pub async fn export_portals(config: &Config, cancel: CancelSignal) -> Result<ExportReport> {
    let client = PortalClient::new(config, &config.source, "source", cancel)?;
    if config.export.max_concurrency == 0 {
        tracing::debug!("portal requests are not bounded (export.max_concurrency = 0)");
    }
    let exporter = PortalExporter::new(Arc::new(client), ExportLayout::new(&config.export.dest));
    exporter.export_all().await
}

pub fn import_all_portals(config: &Config, src: &Path) -> Result<()> {
    PortalClient::new(config, &config.destination, "destination", CancelSignal::never())?;
    warn!(org = %config.destination.org, src = %src.display(), "portal import requested");
    Err(PortalError::NotSupported("importing portals"))
}

pub fn delete_all_portals(config: &Config) -> Result<()> {
    PortalClient::new(config, &config.destination, "destination", CancelSignal::never())?;
    warn!(org = %config.destination.org, "portal purge requested");
    Err(PortalError::NotSupported("deleting portals"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrgConfig, SUPPORTED_PORTAL_URL};

    fn config_with_destination(portal_url: &str) -> Config {
        let mut config = Config::default();
        config.destination = OrgConfig {
            org: "acme-staging".into(),
            username: "ops@acme.test".into(),
            password: "hunter2".into(),
            portal_url: portal_url.into(),
        };
        config
    }

    #[test]
    fn test_import_is_not_supported() {
        let config = config_with_destination(SUPPORTED_PORTAL_URL);
        let err = import_all_portals(&config, Path::new("data/portals")).unwrap_err();
        assert!(matches!(err, PortalError::NotSupported(_)));
        assert_eq!(err.to_string(), "importing portals is not supported");
    }

    #[test]
    fn test_delete_is_not_supported() {
        let config = config_with_destination(SUPPORTED_PORTAL_URL);
        let err = delete_all_portals(&config).unwrap_err();
        assert!(matches!(err, PortalError::NotSupported(_)));
    }

    #[test]
    fn test_commands_check_config_first() {
        let config = config_with_destination("https://edge.private.acme.test");
        assert!(matches!(
            delete_all_portals(&config),
            Err(PortalError::Config(_))
        ));
        assert!(matches!(
            import_all_portals(&config, Path::new("data/portals")),
            Err(PortalError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_export_rejects_incomplete_source() {
        let config = Config::default();
        let err = export_portals(&config, CancelSignal::never()).await.unwrap_err();
        assert!(matches!(err, PortalError::Config(_)));
        assert!(err.to_string().contains("source.username is not set"));
    }
}
