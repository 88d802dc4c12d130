//! Resolution from repository metadata archives.
//!
//! A folder is either composite (`compositeContent.jar` lists child locations)
//! or simple (`content.jar` lists artifacts). Composite graphs may share
//! branches or form cycles, so every folder is entered at most once.

use super::classifier::{ArtifactKey, ClassifierTable};
use super::{child_folder, ResolveContext, ResolveStrategy, Visit};
use crate::utils::{MirrorError, Result};
use async_trait::async_trait;
use std::io::{Cursor, Read};
use tracing::debug;
use url::Url;

pub const COMPOSITE_CONTENT_JAR: &str = "compositeContent.jar";
pub const COMPOSITE_ARTIFACTS_JAR: &str = "compositeArtifacts.jar";
pub const CONTENT_JAR: &str = "content.jar";
pub const ARTIFACTS_JAR: &str = "artifacts.jar";

pub const COMPOSITE_CONTENT_XML: &str = "compositeContent.xml";
pub const CONTENT_XML: &str = "content.xml";

#[derive(Debug, Clone, Default)]
pub struct MetadataResolver {
    classifiers: ClassifierTable,
}

impl MetadataResolver {
    pub fn new(classifiers: ClassifierTable) -> Self {
        Self { classifiers }
    }

    fn resolve_content(
        &self,
        ctx: &mut ResolveContext<'_>,
        folder: &Url,
        archive: &[u8],
        content_url: Url,
    ) -> Result<()> {
        let xml = read_archive_entry(archive, CONTENT_XML)?;
        let artifacts = parse_content_artifacts(&xml)?;
        debug!("{} lists {} artifacts", content_url, artifacts.len());

        ctx.add_file(content_url)?;
        ctx.add_file(folder.join(ARTIFACTS_JAR)?)?;

        for artifact in &artifacts {
            let relative = self.classifiers.relative_path(artifact)?;
            ctx.add_file(folder.join(&relative)?)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResolveStrategy for MetadataResolver {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn resolve_folder(&self, ctx: &mut ResolveContext<'_>, folder: &Url) -> Result<Visit> {
        if !ctx.enter(folder) {
            debug!("Already visited {}", folder);
            return Ok(Visit::Applied);
        }

        let composite_url = folder.join(COMPOSITE_CONTENT_JAR)?;
        if let Some(archive) = ctx.fetcher().probe(&composite_url).await? {
            let xml = read_archive_entry(&archive, COMPOSITE_CONTENT_XML)?;
            let children = parse_composite_children(&xml)?;
            debug!("{} lists {} children", composite_url, children.len());

            ctx.add_file(composite_url)?;
            ctx.add_file(folder.join(COMPOSITE_ARTIFACTS_JAR)?)?;

            for location in &children {
                let child = child_folder(folder, location)?;
                if self.resolve_folder(ctx, &child).await? == Visit::NotApplicable {
                    debug!("Child {} carries no metadata, treating as empty", child);
                }
            }
            return Ok(Visit::Applied);
        }

        let content_url = folder.join(CONTENT_JAR)?;
        match ctx.fetcher().probe(&content_url).await? {
            Some(archive) => {
                self.resolve_content(ctx, folder, &archive, content_url)?;
                Ok(Visit::Applied)
            }
            None => Ok(Visit::NotApplicable),
        }
    }
}

/// Read a named text document out of a zip archive held in memory
pub fn read_archive_entry(archive: &[u8], name: &str) -> Result<String> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;
    let mut entry = zip.by_name(name)?;
    let mut document = String::new();
    entry.read_to_string(&mut document)?;
    Ok(document)
}

/// Child locations of a composite descriptor
pub fn parse_composite_children(xml: &str) -> Result<Vec<String>> {
    let doc = roxmltree::Document::parse(xml)?;
    doc.descendants()
        .filter(|node| node.has_tag_name("child"))
        .map(|node| {
            node.attribute("location")
                .map(str::to_string)
                .ok_or_else(|| {
                    MirrorError::Resolution("composite child without a location".to_string())
                })
        })
        .collect()
}

/// Artifact entries of a content descriptor
pub fn parse_content_artifacts(xml: &str) -> Result<Vec<ArtifactKey>> {
    let doc = roxmltree::Document::parse(xml)?;
    doc.descendants()
        .filter(|node| node.has_tag_name("artifact"))
        .map(|node| {
            match (
                node.attribute("id"),
                node.attribute("version"),
                node.attribute("classifier"),
            ) {
                (Some(id), Some(version), Some(classifier)) => {
                    Ok(ArtifactKey::new(id, version, classifier))
                }
                _ => Err(MirrorError::Resolution(format!(
                    "artifact entry missing id, version or classifier at byte {}",
                    node.range().start
                ))),
            }
        })
        .collect()
}
