//! Maven `pom.xml` reader.
//!
//! Only the pieces needed to name the built jar are extracted: `artifactId`
//! and the effective `version`. The version falls back to the parent's when
//! the project does not declare one, and `${...}` placeholders are resolved
//! from `<properties>` the way Maven's CI-friendly versions (`${revision}`)
//! expect.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use roxmltree::{Document, Node};
use tracing::debug;

use crate::core::artifact::ArtifactCoordinates;

pub const POM_FILE: &str = "pom.xml";

/// The subset of a Maven project model the runner cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomModel {
    pub artifact_id: String,
    pub version: String,
}

impl PomModel {
    pub fn coordinates(&self) -> ArtifactCoordinates {
        ArtifactCoordinates::new(&self.artifact_id, &self.version)
    }
}

/// Read and parse the POM at `path`.
pub fn load_pom(path: &Path) -> Result<PomModel> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let model = parse_pom(&contents).with_context(|| format!("parse {}", path.display()))?;
    debug!(artifact_id = %model.artifact_id, version = %model.version, "loaded pom");
    Ok(model)
}

/// Parse POM XML text.
pub fn parse_pom(xml: &str) -> Result<PomModel> {
    let doc = Document::parse(xml).context("malformed xml")?;
    let project = doc.root_element();
    if project.tag_name().name() != "project" {
        bail!(
            "root element is <{}>, expected <project>",
            project.tag_name().name()
        );
    }

    let parent = child(project, "parent");
    let parent_version = parent.and_then(|p| child_text(p, "version"));

    let artifact_id =
        child_text(project, "artifactId").ok_or_else(|| anyhow!("missing <artifactId>"))?;
    let raw_version = child_text(project, "version")
        .or_else(|| parent_version.clone())
        .ok_or_else(|| anyhow!("missing <version> (and no <parent> version to inherit)"))?;

    let mut properties = child(project, "properties")
        .map(|props| {
            props
                .children()
                .filter(Node::is_element)
                .map(|p| (p.tag_name().name().to_string(), text_of(p)))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();
    if let Some(v) = &parent_version {
        properties.insert("project.parent.version".to_string(), v.clone());
    }
    let version = interpolate(&raw_version, &properties)?;
    properties.insert("project.version".to_string(), version.clone());

    Ok(PomModel {
        artifact_id: interpolate(&artifact_id, &properties)?,
        version,
    })
}

/// Resolve `${name}` placeholders. Unknown names are an error since the
/// resulting jar name would never match what Maven writes.
fn interpolate(value: &str, properties: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow!("unterminated placeholder in {value:?}"))?;
        let name = &after[..end];
        let resolved = properties
            .get(name)
            .ok_or_else(|| anyhow!("unresolved property ${{{name}}} in {value:?}"))?;
        if resolved.contains("${") {
            bail!("nested placeholder in property {name}");
        }
        out.push_str(resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: Node<'_, '_>, name: &str) -> Option<String> {
    child(node, name)
        .map(text_of)
        .filter(|text| !text.is_empty())
}

fn text_of(node: Node<'_, '_>) -> String {
    node.text().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <groupId>com.example</groupId>
  <artifactId>app</artifactId>
  <version>1.0</version>
  <dependencies>
    <dependency>
      <artifactId>not-this-one</artifactId>
      <version>9.9</version>
    </dependency>
  </dependencies>
</project>
"#;

    #[test]
    fn reads_top_level_coordinates() {
        let model = parse_pom(SIMPLE).expect("parse");
        assert_eq!(model.artifact_id, "app");
        assert_eq!(model.version, "1.0");
        assert_eq!(model.coordinates(), ArtifactCoordinates::new("app", "1.0"));
    }

    #[test]
    fn version_falls_back_to_parent() {
        let xml = r#"<project>
  <parent>
    <groupId>com.example</groupId>
    <artifactId>base</artifactId>
    <version>2.1.0</version>
  </parent>
  <artifactId>child</artifactId>
</project>"#;
        let model = parse_pom(xml).expect("parse");
        assert_eq!(model.version, "2.1.0");
    }

    #[test]
    fn resolves_version_from_properties() {
        let xml = r#"<project>
  <artifactId>svc</artifactId>
  <version>${revision}${changelist}</version>
  <properties><revision>1.4</revision><changelist>-SNAPSHOT</changelist></properties>
</project>"#;
        let model = parse_pom(xml).expect("parse");
        assert_eq!(model.version, "1.4-SNAPSHOT");
    }

    #[test]
    fn artifact_id_may_reference_project_version() {
        let xml = r#"<project>
  <parent><artifactId>base</artifactId><version>3.0</version></parent>
  <artifactId>tool-${project.version}</artifactId>
</project>"#;
        let model = parse_pom(xml).expect("parse");
        assert_eq!(model.artifact_id, "tool-3.0");
        assert_eq!(model.version, "3.0");
    }

    #[test]
    fn unresolved_property_is_an_error() {
        let xml = "<project><artifactId>svc</artifactId><version>${revision}</version></project>";
        let err = parse_pom(xml).unwrap_err();
        assert!(format!("{err:#}").contains("unresolved property ${revision}"));
    }

    #[test]
    fn missing_artifact_id_is_an_error() {
        let err = parse_pom("<project><version>1</version></project>").unwrap_err();
        assert!(err.to_string().contains("missing <artifactId>"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_pom("<project><artifactId>").is_err());
    }

    #[test]
    fn load_reports_path_on_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(POM_FILE);
        let err = load_pom(&path).unwrap_err();
        assert!(err.to_string().contains("pom.xml"));
    }
}
