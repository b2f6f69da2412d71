//! Starter files for a fresh project.

/// Entry page wired to the starter stylesheet and script.
pub fn index_html(project_name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{project_name}</title>
  <link rel="stylesheet" href="style.css">
</head>
<body>
  <main>
    <h1>{project_name}</h1>
    <p id="status">Describe what you want to build.</p>
  </main>
  <script src="script.js"></script>
</body>
</html>
"#
    )
}

pub fn style_css() -> &'static str {
    r#"* {
  box-sizing: border-box;
}

body {
  margin: 0;
  min-height: 100vh;
  display: grid;
  place-items: center;
  font-family: system-ui, sans-serif;
  background: #0f172a;
  color: #e2e8f0;
}
"#
}

pub fn script_js() -> &'static str {
    r#"document.addEventListener("DOMContentLoaded", () => {
  const status = document.getElementById("status");
  if (status) {
    status.textContent += " Ready.";
  }
});
"#
}
