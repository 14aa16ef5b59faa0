//! Which camera topics are extracted, and how a topic name becomes the key
//! used for its output directory and calibration file.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Raw camera topics of the reference vehicle.
pub const RAW_TOPICS: &[&str] = &[
    "/vimba_rear/image",
    "/vimba_left/image",
    "/vimba_front/image",
    "/vimba_right/image",
];

/// Topics extracted with `--compressed`. Raw topics without a compressed
/// counterpart on the vehicle stay in the set.
pub const COMPRESSED_TOPICS: &[&str] = &[
    "/vimba_front/image/compressed",
    "/vimba_left/image/compressed",
    "/vimba_right/image/compressed",
    "/vimba_rear/image/compressed",
    "/vimba_rear/image",
    "/vimba_front_left/image",
    "/vimba_front/image",
    "/vimba_right/image",
];

/// `key` names the camera (and its calibration file). The optional `variant`
/// group keeps a camera's raw and compressed streams in separate directories.
pub const DEFAULT_RULE: &str =
    r"^/(?P<key>[A-Za-z0-9_]+)/image(?:/(?P<variant>compressed))?$";

fn safe_component(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}

pub fn default_topics(compressed: bool) -> Vec<String> {
    let topics = if compressed {
        COMPRESSED_TOPICS
    } else {
        RAW_TOPICS
    };
    topics.iter().map(|t| t.to_string()).collect()
}

/// Maps topic names to keys through a regular expression with a `key` group
/// and an optional `variant` group.
#[derive(Debug, Clone)]
pub struct TopicNaming {
    rule: Regex,
}

impl TopicNaming {
    pub fn new(pattern: &str) -> Result<Self> {
        let rule = Regex::new(pattern)
            .map_err(|e| Error::TopicNaming(format!("invalid rule {pattern:?}: {e}")))?;
        if !rule.capture_names().any(|name| name == Some("key")) {
            return Err(Error::TopicNaming(format!(
                "rule {pattern:?} has no named group `key`"
            )));
        }
        Ok(TopicNaming { rule })
    }

    /// Camera key of `topic`, used to find its calibration.
    pub fn key(&self, topic: &str) -> Option<String> {
        let key = self.rule.captures(topic)?.name("key")?.as_str();
        safe_component(key).then(|| key.to_string())
    }

    /// Output directory name of `topic`: the key, suffixed with `_<variant>`
    /// when the rule's `variant` group matched.
    pub fn dir_name(&self, topic: &str) -> Option<String> {
        let captures = self.rule.captures(topic)?;
        let key = captures.name("key")?.as_str();
        if !safe_component(key) {
            return None;
        }
        match captures.name("variant").map(|v| v.as_str()) {
            None | Some("") => Some(key.to_string()),
            Some(variant) if safe_component(variant) => Some(format!("{key}_{variant}")),
            Some(_) => None,
        }
    }

    /// Checks every topic up front. Fails listing all topics that do not map
    /// to a key, or every group of topics that would share a directory.
    pub fn validate<'a, I>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut unmatched = Vec::new();
        let mut dirs: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for topic in topics {
            match self.dir_name(topic) {
                Some(dir) => dirs.entry(dir).or_default().push(topic),
                None => unmatched.push(topic),
            }
        }
        if !unmatched.is_empty() {
            return Err(Error::TopicNaming(format!(
                "no key for topic(s) {} under rule {:?}",
                unmatched.join(", "),
                self.rule.as_str()
            )));
        }

        let shared: Vec<String> = dirs
            .iter()
            .filter(|(_, topics)| topics.len() > 1)
            .map(|(dir, topics)| format!("{} -> {dir}", topics.join(" and ")))
            .collect();
        if shared.is_empty() {
            Ok(())
        } else {
            Err(Error::TopicNaming(format!(
                "topics would share an output directory: {}",
                shared.join("; ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_keys_by_camera_namespace() {
        let naming = TopicNaming::new(DEFAULT_RULE).unwrap();
        assert_eq!(naming.key("/vimba_front/image").as_deref(), Some("vimba_front"));
        assert_eq!(
            naming.key("/vimba_rear/image/compressed").as_deref(),
            Some("vimba_rear")
        );
        assert_eq!(naming.key("/imu/data"), None);
    }

    #[test]
    fn compressed_streams_get_their_own_directory() {
        let naming = TopicNaming::new(DEFAULT_RULE).unwrap();
        assert_eq!(
            naming.dir_name("/vimba_front/image").as_deref(),
            Some("vimba_front")
        );
        assert_eq!(
            naming.dir_name("/vimba_front/image/compressed").as_deref(),
            Some("vimba_front_compressed")
        );
        naming
            .validate(COMPRESSED_TOPICS.iter().copied())
            .unwrap();
    }

    #[test]
    fn topics_sharing_a_directory_are_rejected() {
        let naming = TopicNaming::new(r"^/(?P<key>\w+)/image(?:/compressed)?$").unwrap();
        let err = naming
            .validate(["/vimba_front/image", "/vimba_front/image/compressed", "/vimba_rear/image"])
            .unwrap_err();
        let Error::TopicNaming(message) = err else {
            panic!("unexpected error");
        };
        assert!(message.contains("/vimba_front/image and /vimba_front/image/compressed"));
        assert!(!message.contains("vimba_rear"));
    }

    #[test]
    fn custom_rules_need_a_key_group() {
        assert!(matches!(
            TopicNaming::new(r"^/(\w+)/image$"),
            Err(Error::TopicNaming(_))
        ));
        assert!(matches!(TopicNaming::new("("), Err(Error::TopicNaming(_))));

        let naming = TopicNaming::new(r"^/vimba_(?P<key>\w+)/image/compressed$").unwrap();
        assert_eq!(
            naming.key("/vimba_front/image/compressed").as_deref(),
            Some("front")
        );
    }

    #[test]
    fn keys_cannot_escape_the_output_directory() {
        let naming = TopicNaming::new(r"^(?P<key>.*)$").unwrap();
        assert_eq!(naming.key("a/b"), None);
        assert_eq!(naming.key(".."), None);
        assert_eq!(naming.key("cam0").as_deref(), Some("cam0"));
    }

    #[test]
    fn validation_lists_every_unmatched_topic() {
        let naming = TopicNaming::new(DEFAULT_RULE).unwrap();
        let err = naming
            .validate(["/vimba_front/image", "/lidar/points", "/gps"])
            .unwrap_err();
        let Error::TopicNaming(message) = err else {
            panic!("unexpected error");
        };
        assert!(message.contains("/lidar/points"));
        assert!(message.contains("/gps"));
        assert!(!message.contains("/vimba_front/image,"));
    }
}
