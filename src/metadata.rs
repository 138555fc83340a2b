use chrono::{NaiveDate, Utc};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::error::{ArchiveError, Result};

/// Staged record metadata, assembled from message text, pinged roles, or a
/// prior message in the same set before each item is persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub file: String,
    pub filetype: String,
    pub title: String,
    pub idol: String,
    pub group: String,
    pub tags: String,
    pub uploader: String,
    pub date: String,
    pub source: String,
    #[serde(rename = "discord")]
    pub discord_link: String,
    pub mirror: String,
    pub hq_mirror: String,
    pub set_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IdolGroup {
    pub idol: String,
    pub group: String,
}

pub struct Extractor {
    imgur_pattern: Regex,
    role_pattern: Regex,
    youtube_pattern: Regex,
    pixeldrain_pattern: Regex,
}

impl Extractor {
    pub fn new() -> Self {
        Self {
            imgur_pattern: Regex::new(r"https?://(i\.)?imgur\.com/([a-zA-Z0-9]+)(\.[a-zA-Z0-9]+)?")
                .unwrap(),
            role_pattern: Regex::new(r"(\w+) \[([^\]]+)\]").unwrap(),
            youtube_pattern: Regex::new(
                r"(?:https?://)?(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)[\w\-]{11}",
            )
            .unwrap(),
            pixeldrain_pattern: Regex::new(
                r"(?:https?://)?(?:www\.)?pixeldrain\.com/(?:u|l)/[a-zA-Z0-9]+",
            )
            .unwrap(),
        }
    }

    /// Fills `metadata` from `key: value` lines in the message body.
    ///
    /// Only the first colon on a line separates key from value, unknown keys
    /// are skipped, and fields already seeded (e.g. from role pings) survive
    /// unless the text overrides them. Idol and group are mandatory once
    /// parsing finishes; title, source, and hqMirror fall back to synthesized
    /// or scanned values.
    pub fn extract(&self, content: &str, metadata: &mut Metadata) -> Result<()> {
        for line in content.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().to_string();

            match key {
                "file" => metadata.file = value,
                "filetype" => metadata.filetype = value,
                "title" => metadata.title = value,
                "idol" => metadata.idol = value,
                "group" => metadata.group = value,
                "tags" => metadata.tags = value,
                "uploader" => metadata.uploader = value,
                "date" => metadata.date = value,
                "source" => metadata.source = value,
                "discord" => metadata.discord_link = value,
                "mirror" => metadata.mirror = value,
                "hqMirror" => metadata.hq_mirror = value,
                "setId" => metadata.set_id = value,
                _ => {}
            }
        }

        if metadata.idol.is_empty() || metadata.group.is_empty() {
            return Err(ArchiveError::Validation(
                "no idol or group string found".to_string(),
            ));
        }

        if metadata.title.is_empty() {
            metadata.title = format!("{} from {}", metadata.idol, metadata.group);
        }

        if metadata.source.is_empty() {
            if let Some(found) = self.youtube_pattern.find(content) {
                metadata.source = found.as_str().to_string();
            }
        }

        if metadata.hq_mirror.is_empty() {
            if let Some(found) = self.pixeldrain_pattern.find(content) {
                metadata.hq_mirror = found.as_str().to_string();
            }
        }

        Ok(())
    }

    /// Returns every recognized imgur link in the content, normalized to the
    /// canonical `https://i.imgur.com/<id>.mp4` form.
    pub fn media_links(&self, content: &str) -> Vec<String> {
        self.imgur_pattern
            .captures_iter(content)
            .map(|cap| normalize_media_link(&cap))
            .collect()
    }

    /// Extracts `Name [Group]` pairs from pinged role names. Roles that do
    /// not match the pattern are skipped.
    pub fn parse_role_names(&self, role_names: &[String]) -> Vec<IdolGroup> {
        role_names
            .iter()
            .filter_map(|name| {
                self.role_pattern.captures(name).map(|cap| IdolGroup {
                    idol: cap[1].to_string(),
                    group: cap[2].to_string(),
                })
            })
            .collect()
    }

    /// Builds a seed Metadata from pinged roles: idol and group names
    /// deduplicated in first-seen order, comma-joined.
    pub fn seed_from_roles(&self, role_names: &[String]) -> Metadata {
        let pairs = self.parse_role_names(role_names);

        let mut idols: Vec<String> = Vec::new();
        let mut groups: Vec<String> = Vec::new();
        for pair in pairs {
            if !idols.contains(&pair.idol) {
                idols.push(pair.idol);
            }
            if !groups.contains(&pair.group) {
                groups.push(pair.group);
            }
        }

        Metadata {
            idol: idols.join(", "),
            group: groups.join(", "),
            ..Metadata::default()
        }
    }
}

fn normalize_media_link(cap: &Captures) -> String {
    let direct_host = cap.get(1).map(|m| m.as_str()) == Some("i.");
    let media_id = &cap[2];
    let has_extension = cap.get(3).is_some();

    if !direct_host || !has_extension {
        format!("https://i.imgur.com/{}.mp4", media_id)
    } else {
        cap[0].to_string()
    }
}

/// Converts a user-typed date to RFC 3339 where possible. `now`/`today` mean
/// the current instant and a bare `YYMMDD` is taken as midnight UTC; anything
/// else passes through unchanged.
pub fn normalize_date(raw: &str) -> String {
    if raw == "now" || raw == "today" {
        return Utc::now().to_rfc3339();
    }

    if raw.len() == 6 {
        if let Some(parsed) = NaiveDate::parse_from_str(raw, "%y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return parsed.and_utc().to_rfc3339();
        }
    }

    raw.to_string()
}

/// Returns the `YYMMDD` stamp used to prefix set titles, falling back to
/// today's date when the typed value is absent or malformed.
pub fn date_stamp(raw: &str) -> String {
    if raw.len() == 6 && NaiveDate::parse_from_str(raw, "%y%m%d").is_ok() {
        raw.to_string()
    } else {
        Utc::now().format("%y%m%d").to_string()
    }
}

/// Splits a comma-separated tag string, trimming whitespace and dropping
/// empty segments. Tag case is preserved.
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::new()
    }

    #[test]
    fn extracts_key_value_lines() {
        let mut meta = Metadata::default();
        let content = "idol: Yujin\ngroup: IVE\ntitle: fancam\ntags: stage, 4k";
        extractor().extract(content, &mut meta).unwrap();

        assert_eq!(meta.idol, "Yujin");
        assert_eq!(meta.group, "IVE");
        assert_eq!(meta.title, "fancam");
        assert_eq!(meta.tags, "stage, 4k");
    }

    #[test]
    fn splits_on_first_colon_only() {
        let mut meta = Metadata::default();
        let content = "idol: Yujin\ngroup: IVE\nsource: https://youtu.be/abcdefghijk";
        extractor().extract(content, &mut meta).unwrap();

        assert_eq!(meta.source, "https://youtu.be/abcdefghijk");
    }

    #[test]
    fn missing_idol_or_group_is_an_error() {
        let mut meta = Metadata::default();
        assert!(extractor().extract("group: IVE", &mut meta).is_err());

        let mut meta = Metadata::default();
        assert!(extractor().extract("idol: Yujin", &mut meta).is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut meta = Metadata::default();
        extractor()
            .extract("idol: Yujin\ngroup: IVE\nnonsense: value", &mut meta)
            .unwrap();
        assert_eq!(meta.idol, "Yujin");
    }

    #[test]
    fn synthesizes_title_when_missing() {
        let mut meta = Metadata::default();
        extractor()
            .extract("idol: Yujin\ngroup: IVE", &mut meta)
            .unwrap();
        assert_eq!(meta.title, "Yujin from IVE");
    }

    #[test]
    fn seeded_fields_survive_unless_overridden() {
        let mut meta = Metadata {
            idol: "Yujin".to_string(),
            group: "IVE".to_string(),
            ..Metadata::default()
        };
        extractor().extract("tags: stage", &mut meta).unwrap();
        assert_eq!(meta.idol, "Yujin");

        let mut meta = Metadata {
            idol: "Yujin".to_string(),
            group: "IVE".to_string(),
            ..Metadata::default()
        };
        extractor().extract("idol: Wonyoung", &mut meta).unwrap();
        assert_eq!(meta.idol, "Wonyoung");
    }

    #[test]
    fn scans_whole_text_for_source_fallback() {
        let mut meta = Metadata::default();
        let content = "idol: Yujin\ngroup: IVE\ncheck this https://youtu.be/dQw4w9WgXcQ out";
        extractor().extract(content, &mut meta).unwrap();
        assert_eq!(meta.source, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn explicit_source_wins_over_scan() {
        let mut meta = Metadata::default();
        let content =
            "idol: Yujin\ngroup: IVE\nsource: manual\nhttps://youtu.be/dQw4w9WgXcQ";
        extractor().extract(content, &mut meta).unwrap();
        assert_eq!(meta.source, "manual");
    }

    #[test]
    fn scans_whole_text_for_hq_mirror_fallback() {
        let mut meta = Metadata::default();
        let content = "idol: Yujin\ngroup: IVE\nhttps://pixeldrain.com/u/aBc123";
        extractor().extract(content, &mut meta).unwrap();
        assert_eq!(meta.hq_mirror, "https://pixeldrain.com/u/aBc123");
    }

    #[test]
    fn normalizes_bare_imgur_link() {
        let links = extractor().media_links("https://imgur.com/abc123");
        assert_eq!(links, vec!["https://i.imgur.com/abc123.mp4"]);
    }

    #[test]
    fn normalizes_direct_link_without_extension() {
        let links = extractor().media_links("https://i.imgur.com/abc123");
        assert_eq!(links, vec!["https://i.imgur.com/abc123.mp4"]);
    }

    #[test]
    fn canonical_link_passes_through_unchanged() {
        let links = extractor().media_links("https://i.imgur.com/abc123.mp4");
        assert_eq!(links, vec!["https://i.imgur.com/abc123.mp4"]);
    }

    #[test]
    fn finds_multiple_links() {
        let content = "https://imgur.com/one1 and https://i.imgur.com/two22.gif";
        let links = extractor().media_links(content);
        assert_eq!(
            links,
            vec![
                "https://i.imgur.com/one1.mp4",
                "https://i.imgur.com/two22.gif"
            ]
        );
    }

    #[test]
    fn parses_role_names() {
        let names = vec![
            "Yujin [IVE]".to_string(),
            "Moderator".to_string(),
            "Hanni [NewJeans]".to_string(),
        ];
        let pairs = extractor().parse_role_names(&names);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].idol, "Yujin");
        assert_eq!(pairs[0].group, "IVE");
        assert_eq!(pairs[1].group, "NewJeans");
    }

    #[test]
    fn role_seed_dedups_in_first_seen_order() {
        let names = vec![
            "Yujin [IVE]".to_string(),
            "Wonyoung [IVE]".to_string(),
            "Yujin [IVE]".to_string(),
        ];
        let meta = extractor().seed_from_roles(&names);
        assert_eq!(meta.idol, "Yujin, Wonyoung");
        assert_eq!(meta.group, "IVE");
    }

    #[test]
    fn normalizes_yymmdd_date() {
        assert_eq!(normalize_date("240131"), "2024-01-31T00:00:00+00:00");
    }

    #[test]
    fn passes_through_unrecognized_date() {
        assert_eq!(normalize_date("sometime"), "sometime");
    }

    #[test]
    fn date_stamp_keeps_valid_input() {
        assert_eq!(date_stamp("240131"), "240131");
    }

    #[test]
    fn date_stamp_falls_back_to_today() {
        let stamp = date_stamp("not-a-date");
        assert_eq!(stamp.len(), 6);
        assert!(stamp.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn splits_tags_preserving_case() {
        assert_eq!(split_tags("Stage, 4K , ,fancam"), vec!["Stage", "4K", "fancam"]);
        assert!(split_tags("").is_empty());
    }
}
