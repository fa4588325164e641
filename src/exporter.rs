use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::client::PortalClient;
use crate::error::{PortalError, Result};
use crate::perf;
use crate::portal;
use crate::storage::{write_atomic, ExportLayout, PathSegmentError};

/// One export branch that produced no output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchFailure {
    pub site_id: String,
    pub resource: &'static str,
    pub item: Option<String>,
    pub detail: String,
}

impl fmt::Display for BranchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site {}: {}", self.site_id, self.resource)?;
        if let Some(ref item) = self.item {
            write!(f, " {}", item)?;
        }
        write!(f, ": {}", self.detail)
    }
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub sites: usize,
    pub files_written: usize,
    /// Binary assets listed by the portal but not downloaded.
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<BranchFailure>,
}

impl ExportReport {
    fn merge(&mut self, other: ExportReport) {
        self.sites += other.sites;
        self.files_written += other.files_written;
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
    }

    fn merged(reports: Vec<ExportReport>) -> ExportReport {
        reports.into_iter().fold(ExportReport::default(), |mut acc, r| {
            acc.merge(r);
            acc
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Logs the failure and keeps it in the report, unless it must end the run.
    fn record(
        &mut self,
        site_id: &str,
        resource: &'static str,
        item: Option<&str>,
        err: PortalError,
    ) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(site_id, resource, item, error = %err, "export branch failed");
        self.failures.push(BranchFailure {
            site_id: site_id.to_string(),
            resource,
            item: item.map(str::to_string),
            detail: err.to_string(),
        });
        Ok(())
    }
}

fn unsafe_path(err: PathSegmentError) -> PortalError {
    PortalError::Invalid(err.to_string())
}

/// Walks every site of the source organization and mirrors it under the
/// export root.
pub struct PortalExporter {
    client: Arc<PortalClient>,
    layout: ExportLayout,
}

impl PortalExporter {
    pub fn new(client: Arc<PortalClient>, layout: ExportLayout) -> Self {
        Self { client, layout }
    }

    /// Export all sites. Only login, site listing and cancellation failures
    /// are returned as errors; everything else is collected in the report.
    pub async fn export_all(&self) -> Result<ExportReport> {
        let _perf = perf::scope("export_all");
        info!(org = self.client.org(), root = %self.layout.root().display(), "exporting portals");

        let doc = self.client.get_json(&portal::sites_path()).await?;
        let sites = portal::items(&doc);
        if sites.is_empty() {
            info!("no portal sites found");
            return Ok(ExportReport::default());
        }

        let reports = try_join_all(sites.into_iter().map(|site| self.export_site(site))).await?;
        let report = ExportReport::merged(reports);
        info!(
            sites = report.sites,
            files = report.files_written,
            failures = report.failures.len(),
            "export finished"
        );
        Ok(report)
    }

    async fn export_site(&self, site: &Value) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let Some(site_id) = portal::id_field(site, &["id"]) else {
            report.record(
                "<unknown>",
                "site",
                None,
                PortalError::Invalid("site entry has no id".into()),
            )?;
            return Ok(report);
        };
        let _perf = perf::scope("export_site");
        report.sites = 1;

        match self.layout.site(&site_id) {
            Ok(path) => self.write(&mut report, &site_id, "site", None, path, site).await?,
            Err(e) => {
                report.record(&site_id, "site", None, unsafe_path(e))?;
                return Ok(report);
            }
        }

        let (pages, css, files, menu, apidocs) = tokio::try_join!(
            self.export_pages(&site_id),
            self.export_custom_css(&site_id),
            self.export_files(&site_id),
            self.export_menu(&site_id),
            self.export_api_docs(&site_id),
        )?;
        for branch in [pages, css, files, menu, apidocs] {
            report.merge(branch);
        }
        Ok(report)
    }

    async fn export_pages(&self, site_id: &str) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let doc = match self.client.get_json(&portal::pages_path(site_id)).await {
            Ok(doc) => doc,
            Err(e) => {
                report.record(site_id, "pages", None, e)?;
                return Ok(report);
            }
        };

        let pages = try_join_all(
            portal::items(&doc)
                .into_iter()
                .map(|page| self.export_page(site_id, page)),
        )
        .await?;
        report.merge(ExportReport::merged(pages));
        Ok(report)
    }

    async fn export_page(&self, site_id: &str, page: &Value) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let Some(friendly_id) = portal::id_field(page, &["friendlyId"]) else {
            report.record(
                site_id,
                "page",
                None,
                PortalError::Invalid("page has no friendlyId".into()),
            )?;
            return Ok(report);
        };
        let item = Some(friendly_id.as_str());

        let paths = self
            .layout
            .page(site_id, &friendly_id)
            .and_then(|p| Ok((p, self.layout.page_permissions(site_id, &friendly_id)?)));
        let (page_path, permissions_path) = match paths {
            Ok(paths) => paths,
            Err(e) => {
                report.record(site_id, "page", item, unsafe_path(e))?;
                return Ok(report);
            }
        };

        self.write(&mut report, site_id, "page", item, page_path, page)
            .await?;

        match self
            .client
            .get_json(&portal::page_permissions_path(site_id, &friendly_id))
            .await
        {
            Ok(doc) => {
                let body = portal::permission_body(&doc);
                self.write(&mut report, site_id, "page permissions", item, permissions_path, body)
                    .await?;
            }
            Err(e) => report.record(site_id, "page permissions", item, e)?,
        }
        Ok(report)
    }

    async fn export_custom_css(&self, site_id: &str) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        match self.client.get_json(&portal::custom_css_path(site_id)).await {
            Ok(doc) => {
                if let Some(css) = portal::payload(&doc) {
                    match self.layout.custom_css(site_id) {
                        Ok(path) => {
                            self.write(&mut report, site_id, "customcss", None, path, css)
                                .await?
                        }
                        Err(e) => report.record(site_id, "customcss", None, unsafe_path(e))?,
                    }
                }
            }
            Err(e) => report.record(site_id, "customcss", None, e)?,
        }
        Ok(report)
    }

    async fn export_files(&self, site_id: &str) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let doc = match self.client.get_json(&portal::file_list_path(site_id)).await {
            Ok(doc) => doc,
            Err(e) => {
                report.record(site_id, "files", None, e)?;
                return Ok(report);
            }
        };
        let Some(listing) = portal::payload(&doc) else {
            return Ok(report);
        };

        match self.layout.file_listing(site_id) {
            Ok(path) => {
                self.write(&mut report, site_id, "files", None, path, listing)
                    .await?
            }
            Err(e) => report.record(site_id, "files", None, unsafe_path(e))?,
        }

        // TODO: download asset bytes once the portal's file content endpoint is known.
        for file in portal::items(&doc) {
            let Some(filename) = portal::id_field(file, &["filename"]) else {
                continue;
            };
            match self.layout.file_asset(site_id, &filename) {
                Ok(path) => {
                    warn!(
                        site_id,
                        path = %path.display(),
                        error = %PortalError::NotSupported("binary file download"),
                        "asset not exported"
                    );
                    report.skipped.push(path);
                }
                Err(e) => report.record(site_id, "file", Some(filename.as_str()), unsafe_path(e))?,
            }
        }
        Ok(report)
    }

    async fn export_menu(&self, site_id: &str) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let doc = match self.client.get_json(&portal::menu_items_path(site_id)).await {
            Ok(doc) => doc,
            Err(e) => {
                report.record(site_id, "menu", None, e)?;
                return Ok(report);
            }
        };

        for entry in portal::items(&doc) {
            let Some(menu_item_id) = portal::id_field(entry, &["menuItemId"]) else {
                report.record(
                    site_id,
                    "menu item",
                    None,
                    PortalError::Invalid("menu item has no menuItemId".into()),
                )?;
                continue;
            };
            let item = Some(menu_item_id.as_str());
            match self.layout.menu_item(site_id, &menu_item_id) {
                Ok(path) => {
                    self.write(&mut report, site_id, "menu item", item, path, entry)
                        .await?
                }
                Err(e) => report.record(site_id, "menu item", item, unsafe_path(e))?,
            }
        }
        Ok(report)
    }

    async fn export_api_docs(&self, site_id: &str) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        let doc = match self.client.get_json(&portal::api_docs_path(site_id)).await {
            Ok(doc) => doc,
            Err(e) => {
                report.record(site_id, "apidocs", None, e)?;
                return Ok(report);
            }
        };

        let docs = try_join_all(
            portal::items(&doc)
                .into_iter()
                .map(|api_doc| self.export_api_doc(site_id, api_doc)),
        )
        .await?;
        report.merge(ExportReport::merged(docs));
        Ok(report)
    }

    async fn export_api_doc(&self, site_id: &str, api_doc: &Value) -> Result<ExportReport> {
        let mut report = ExportReport::default();
        // Files are named by apiId, entitlements are looked up by the doc's own id.
        let (Some(api_id), Some(entitlement_id)) = (
            portal::id_field(api_doc, &["apiId", "id"]),
            portal::id_field(api_doc, &["id", "apiId"]),
        ) else {
            report.record(
                site_id,
                "apidoc",
                None,
                PortalError::Invalid("api doc has neither apiId nor id".into()),
            )?;
            return Ok(report);
        };
        let item = Some(api_id.as_str());

        let paths = self
            .layout
            .api_doc(site_id, &api_id)
            .and_then(|p| Ok((p, self.layout.api_permissions(site_id, &api_id)?)));
        let (doc_path, permissions_path) = match paths {
            Ok(paths) => paths,
            Err(e) => {
                report.record(site_id, "apidoc", item, unsafe_path(e))?;
                return Ok(report);
            }
        };

        self.write(&mut report, site_id, "apidoc", item, doc_path, api_doc)
            .await?;

        match self
            .client
            .get_json(&portal::api_permissions_path(site_id, &entitlement_id))
            .await
        {
            Ok(doc) => {
                let body = portal::permission_body(&doc);
                self.write(&mut report, site_id, "api permissions", item, permissions_path, body)
                    .await?;
            }
            Err(e) => report.record(site_id, "api permissions", item, e)?,
        }
        Ok(report)
    }

    async fn write(
        &self,
        report: &mut ExportReport,
        site_id: &str,
        resource: &'static str,
        item: Option<&str>,
        path: PathBuf,
        value: &Value,
    ) -> Result<()> {
        match write_atomic(&path, &portal::to_bytes(value)).await {
            Ok(()) => {
                debug!(site_id, path = %path.display(), "wrote file");
                report.files_written += 1;
                Ok(())
            }
            Err(e) => report.record(site_id, resource, item, e),
        }
    }
}
