//! Declarative path mappings selectable from the config file.

use std::path::{Component, Path};

use asset_publisher_core::contract::PathMapper;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PathMapping {
    /// Keep everything after the last directory named `marker`:
    /// `/work/app/dist/js/a.js` with marker `dist` maps to `/js/a.js`.
    AfterMarker { marker: String },
}

impl PathMapper for PathMapping {
    fn map(&self, absolute_path: &Path) -> Option<String> {
        match self {
            PathMapping::AfterMarker { marker } => after_marker(absolute_path, marker),
        }
    }
}

fn after_marker(path: &Path, marker: &str) -> Option<String> {
    let parts: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let last = parts.iter().rposition(|p| p == marker)?;
    let rest = &parts[last + 1..];
    if rest.is_empty() {
        return None;
    }
    Some(format!("/{}", rest.join("/")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(marker: &str) -> PathMapping {
        PathMapping::AfterMarker {
            marker: marker.to_string(),
        }
    }

    #[test]
    fn keeps_tail_after_last_marker() {
        let m = mapping("dist");
        assert_eq!(
            m.map(Path::new("/work/dist/app/dist/js/a.js")),
            Some("/js/a.js".to_string())
        );
    }

    #[test]
    fn no_marker_falls_back() {
        assert_eq!(mapping("dist").map(Path::new("/work/build/a.js")), None);
    }

    #[test]
    fn marker_must_be_a_whole_component() {
        assert_eq!(mapping("dist").map(Path::new("/work/distfiles/a.js")), None);
    }

    #[test]
    fn deserializes_from_yaml() {
        let m: PathMapping = serde_yaml::from_str("kind: after_marker\nmarker: public\n").unwrap();
        assert_eq!(m, mapping("public"));
    }
}
