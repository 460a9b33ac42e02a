use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Accepts both `["bug"]` and GitHub's `[{"name": "bug"}]` shapes
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: Vec<String>,
}

impl Issue {
    /// Title and body joined, used for classification and cache keys
    pub fn text(&self) -> String {
        match self.body.as_deref() {
            Some(body) if !body.trim().is_empty() => format!("{}\n\n{}", self.title, body),
            _ => self.title.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelDto {
    Name(String),
    Object { name: String },
}

fn deserialize_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<LabelDto>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|l| match l {
            LabelDto::Name(n) | LabelDto::Object { name: n } => n,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_accept_github_shape() {
        let raw = r#"[
            {"number": 1, "title": "a", "labels": ["bug", "ui"]},
            {"number": 2, "title": "b", "body": null, "labels": [{"name": "security", "color": "ff0000"}]},
            {"number": 3, "title": "c"}
        ]"#;
        let issues: Vec<Issue> = serde_json::from_str(raw).unwrap();
        assert_eq!(issues[0].labels, vec!["bug", "ui"]);
        assert_eq!(issues[1].labels, vec!["security"]);
        assert!(issues[2].labels.is_empty());
        assert_eq!(issues[2].text(), "c");
    }
}
