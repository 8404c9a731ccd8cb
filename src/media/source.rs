use serde::{Deserialize, Serialize};

/// What kind of surface a capture source refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Screen,
    Window,
}

/// A capturable OS surface, immutable once selected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub id: String,
    pub name: String,
    pub display_id: Option<String>,
    /// Encoded thumbnail image (may be empty)
    #[serde(default)]
    pub thumbnail: Vec<u8>,
    pub kind: SourceKind,
}

/// A physical display as reported by the OS, sizes in device-independent pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: String,
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl DisplayInfo {
    /// Size in physical pixels
    pub fn physical_size(&self) -> (u32, u32) {
        (
            (self.width as f64 * self.scale_factor).round() as u32,
            (self.height as f64 * self.scale_factor).round() as u32,
        )
    }
}

/// Pick the source to preselect: a whole screen if one exists, otherwise the first entry
pub fn pick_default_source(sources: &[MediaSource]) -> Option<&MediaSource> {
    sources
        .iter()
        .find(|s| s.id.starts_with("screen:"))
        .or_else(|| {
            sources
                .iter()
                .find(|s| is_entire_screen_name(&s.name))
        })
        .or_else(|| sources.first())
}

fn is_entire_screen_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    let mut words = lower.split_whitespace();
    while let Some(word) = words.next() {
        if word == "entire" {
            return words.next() == Some("screen");
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, name: &str, kind: SourceKind) -> MediaSource {
        MediaSource {
            id: id.to_string(),
            name: name.to_string(),
            display_id: None,
            thumbnail: Vec::new(),
            kind,
        }
    }

    #[test]
    fn test_prefers_screen_prefix() {
        let sources = vec![
            source("window:1", "Editor", SourceKind::Window),
            source("screen:0", "Display 1", SourceKind::Screen),
        ];
        assert_eq!(pick_default_source(&sources).unwrap().id, "screen:0");
    }

    #[test]
    fn test_falls_back_to_entire_screen_name() {
        let sources = vec![
            source("window:1", "Editor", SourceKind::Window),
            source("custom:7", "Entire  Screen", SourceKind::Screen),
        ];
        assert_eq!(pick_default_source(&sources).unwrap().id, "custom:7");
    }

    #[test]
    fn test_falls_back_to_first() {
        let sources = vec![source("window:1", "Editor", SourceKind::Window)];
        assert_eq!(pick_default_source(&sources).unwrap().id, "window:1");
        assert!(pick_default_source(&[]).is_none());
    }

    #[test]
    fn test_physical_size_rounds() {
        let display = DisplayInfo {
            id: "1".to_string(),
            width: 1440,
            height: 900,
            scale_factor: 1.5,
        };
        assert_eq!(display.physical_size(), (2160, 1350));
    }
}
