use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const MANIFEST_BODY: &str = r#"{
    "latest": {"release": "1.21.4", "snapshot": "24w46a"},
    "versions": [
        {
            "id": "1.21.4",
            "type": "release",
            "url": "https://piston-meta.mojang.com/v1/packages/1.21.4.json",
            "time": "2024-12-03T10:24:48+00:00",
            "releaseTime": "2024-12-03T10:12:57+00:00",
            "sha1": "a3bcba436caa849622fd7e1e5b89489ed6c9ac63",
            "complianceLevel": 1
        },
        {
            "id": "1.21.3",
            "type": "release",
            "releaseTime": "2024-10-23T12:28:15+00:00"
        },
        {
            "id": "1.21",
            "type": "release",
            "releaseTime": "2024-06-13T08:24:03+00:00"
        }
    ]
}"#;

/// Serves [`MANIFEST_BODY`] at `/manifest.json`, failing verification on drop
/// unless it was requested exactly `expected_calls` times.
pub async fn mount_manifest(server: &MockServer, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST_BODY))
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn compare_body(commits: &[(&str, &str)]) -> serde_json::Value {
    let commits: Vec<_> = commits
        .iter()
        .map(|(sha, message)| {
            serde_json::json!({
                "sha": sha,
                "url": format!("https://api.github.com/repos/PaperMC/Paper/commits/{sha}"),
                "commit": {
                    "message": message,
                    "author": {"name": "someone", "date": "2024-12-03T10:12:57Z"}
                }
            })
        })
        .collect();

    serde_json::json!({
        "status": "ahead",
        "ahead_by": commits.len(),
        "commits": commits,
        "files": []
    })
}
