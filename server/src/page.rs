use tracing::warn;

/// Built-in viewer page, used when no `server.index_path` is configured.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>motion-cam</title>
  <style>
    body { margin: 0; background: #111; color: #ddd; font-family: sans-serif; }
    main { display: flex; flex-direction: column; align-items: center; padding: 1rem; }
    img { max-width: 100%; border: 1px solid #333; }
  </style>
</head>
<body>
  <main>
    <h1>motion-cam</h1>
    <img src="/video" alt="live stream">
  </main>
</body>
</html>
"#;

/// Read the configured page on every request so edits show up without a
/// restart. Falls back to [`INDEX_HTML`] if the file cannot be read.
pub async fn load_index(path: Option<&str>) -> String {
    let Some(path) = path else {
        return INDEX_HTML.to_string();
    };
    match tokio::fs::read_to_string(path).await {
        Ok(html) => html,
        Err(e) => {
            warn!(path, error = %e, "failed to read index page, serving built-in page");
            INDEX_HTML.to_string()
        }
    }
}
