//! Fixtures shared by unit tests.

use crate::config::DownloadSettings;
use crate::http::HttpFetcher;
use std::io::{Cursor, Write};

pub fn fetcher_for() -> HttpFetcher {
    HttpFetcher::new(&DownloadSettings::default(), None).unwrap()
}

/// A zip archive with a single text entry
pub fn jar(entry: &str, document: &str) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(entry, zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(document.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

pub fn composite_xml(children: &[&str]) -> String {
    let children: String = children
        .iter()
        .map(|location| format!("    <child location='{}'/>\n", location))
        .collect();
    format!(
        "<?xml version='1.0' encoding='UTF-8'?>\n\
         <?compositeMetadataRepository version='1.0.0'?>\n\
         <repository name='test' type='org.eclipse.equinox.internal.p2.metadata.repository.CompositeMetadataRepository' version='1.0.0'>\n\
           <children size='{}'>\n{}  </children>\n\
         </repository>\n",
        children.lines().count(),
        children
    )
}

pub fn content_xml(artifacts: &[(&str, &str, &str)]) -> String {
    let units: String = artifacts
        .iter()
        .map(|(id, version, classifier)| {
            format!(
                "    <unit id='{id}' version='{version}'>\n\
                       <artifacts size='1'>\n\
                         <artifact classifier='{classifier}' id='{id}' version='{version}'/>\n\
                       </artifacts>\n\
                     </unit>\n"
            )
        })
        .collect();
    format!(
        "<?xml version='1.0' encoding='UTF-8'?>\n\
         <?metadataRepository version='1.1.0'?>\n\
         <repository name='test' type='org.eclipse.equinox.internal.p2.metadata.repository.LocalMetadataRepository' version='1'>\n\
           <units size='{}'>\n{}  </units>\n\
         </repository>\n",
        artifacts.len(),
        units
    )
}

pub fn composite_jar(children: &[&str]) -> Vec<u8> {
    jar("compositeContent.xml", &composite_xml(children))
}

pub fn content_jar(artifacts: &[(&str, &str, &str)]) -> Vec<u8> {
    jar("content.xml", &content_xml(artifacts))
}
