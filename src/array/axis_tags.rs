use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// The semantic kind of an axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    /// A spatial axis.
    #[display("space")]
    Space,
    /// A time axis.
    #[display("time")]
    Time,
    /// A channel axis.
    #[display("channels")]
    Channels,
    /// An axis of unknown kind.
    #[default]
    #[display("unknown")]
    Unknown,
}

impl AxisKind {
    /// Return the conventional kind of an axis with `key`.
    ///
    /// `x`, `y`, and `z` are spatial, `t` is time, and `c` is channels.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "x" | "y" | "z" => Self::Space,
            "t" => Self::Time,
            "c" => Self::Channels,
            _ => Self::Unknown,
        }
    }
}

/// An axis tag: a key identifying the axis and its kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{key}")]
pub struct AxisTag {
    key: String,
    kind: AxisKind,
}

impl AxisTag {
    /// Create a new axis tag.
    #[must_use]
    pub fn new(key: impl Into<String>, kind: AxisKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }

    /// Create a new axis tag with the conventional kind for `key`.
    #[must_use]
    pub fn from_key(key: impl Into<String>) -> Self {
        let key = key.into();
        let kind = AxisKind::from_key(&key);
        Self { key, kind }
    }

    /// Return the key of the axis.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Return the kind of the axis.
    #[must_use]
    pub fn kind(&self) -> AxisKind {
        self.kind
    }
}

/// An ordered list of axis tags, one per dimension of an array.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, From)]
#[serde(transparent)]
pub struct AxisTags(Vec<AxisTag>);

impl AxisTags {
    /// Create axis tags from single character keys, e.g. `"tzyxc"`.
    #[must_use]
    pub fn from_keys(keys: &str) -> Self {
        Self(
            keys.chars()
                .map(|key| AxisTag::from_key(key.to_string()))
                .collect(),
        )
    }

    /// Return the number of axes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no axes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return the axis tag at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&AxisTag> {
        self.0.get(index)
    }

    /// Return an iterator over the axis tags.
    pub fn iter(&self) -> std::slice::Iter<'_, AxisTag> {
        self.0.iter()
    }

    /// Return the index of the axis with `key`.
    #[must_use]
    pub fn index(&self, key: &str) -> Option<usize> {
        self.0.iter().position(|tag| tag.key == key)
    }

    /// Return the index of the first channel axis.
    #[must_use]
    pub fn channel_index(&self) -> Option<usize> {
        self.0.iter().position(|tag| tag.kind == AxisKind::Channels)
    }

    /// Returns true if the axis with `key` exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index(key).is_some()
    }

    /// Return the keys of the axes concatenated.
    #[must_use]
    pub fn keys(&self) -> String {
        self.0.iter().map(AxisTag::key).collect()
    }

    /// Insert `tag` at `index`.
    ///
    /// # Panics
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, tag: AxisTag) {
        self.0.insert(index, tag);
    }

    /// Remove and return the axis tag at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> AxisTag {
        self.0.remove(index)
    }
}

impl<'a> IntoIterator for &'a AxisTags {
    type Item = &'a AxisTag;
    type IntoIter = std::slice::Iter<'a, AxisTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<AxisTag> for AxisTags {
    fn from_iter<I: IntoIterator<Item = AxisTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for AxisTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keys())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_tags_from_keys() {
        let tags = AxisTags::from_keys("tzyxc");
        assert_eq!(tags.len(), 5);
        assert_eq!(tags.index("z"), Some(1));
        assert_eq!(tags.index("q"), None);
        assert_eq!(tags.channel_index(), Some(4));
        assert_eq!(tags.get(0).unwrap().kind(), AxisKind::Time);
        assert_eq!(tags.get(3).unwrap().kind(), AxisKind::Space);
        assert_eq!(tags.to_string(), "tzyxc");
    }

    #[test]
    fn axis_tags_insert_remove() {
        let mut tags = AxisTags::from_keys("xy");
        assert_eq!(tags.channel_index(), None);
        tags.insert(2, AxisTag::new("c", AxisKind::Channels));
        assert_eq!(tags.keys(), "xyc");
        assert_eq!(tags.remove(0), AxisTag::from_key("x"));
        assert_eq!(tags.keys(), "yc");
        assert!(tags.contains("c"));
    }

    #[test]
    fn axis_tags_serde() {
        let tags = AxisTags::from_keys("xc");
        let json = serde_json::to_string(&tags).unwrap();
        assert_eq!(
            json,
            r#"[{"key":"x","kind":"space"},{"key":"c","kind":"channels"}]"#
        );
        assert_eq!(serde_json::from_str::<AxisTags>(&json).unwrap(), tags);
    }
}
