//! Fenced code block extraction from a growing assistant response.
//!
//! The whole buffer is re-scanned on every delta. [`BlockTracker`] remembers only
//! how many blocks it has already handed out and which name each fence was
//! given, so a block is emitted exactly once and fallback names never drift.

use crate::util::extension_of;

const FENCE: &str = "```";

/// One complete file extracted from the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBlock {
    pub name: String,
    pub language: String,
    pub content: String,
}

/// What one call to [`BlockTracker::observe`] discovered.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// Explicit file names whose opening fence just became visible.
    pub opened: Vec<String>,
    /// Blocks whose closing fence just arrived, in document order.
    pub completed: Vec<ParsedBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FenceInfo {
    language: String,
    name: Option<String>,
}

#[derive(Debug)]
struct Fence {
    /// Byte offset of the opening fence line.
    start: usize,
    /// Byte offset just past the closing fence (excluding its newline).
    end: usize,
    info: FenceInfo,
    content: String,
    closed: bool,
}

/// Per-turn block bookkeeping.
#[derive(Debug, Default)]
pub struct BlockTracker {
    names: Vec<String>,
    counter: usize,
    announced: usize,
    emitted: usize,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the buffer while the stream is still open.
    pub fn observe(&mut self, text: &str) -> Observation {
        let fences = scan(text, false);
        self.pin_names(&fences);

        let mut opened = Vec::new();
        for fence in fences.iter().skip(self.announced) {
            if let Some(name) = &fence.info.name {
                opened.push(name.clone());
            }
        }
        self.announced = fences.len();

        let completed = self.take_completed(&fences);
        Observation { opened, completed }
    }

    /// Scan the final buffer and return the blocks not yet handed out.
    pub fn finish(&mut self, text: &str) -> Vec<ParsedBlock> {
        let fences = scan(text, true);
        self.pin_names(&fences);
        self.announced = self.announced.max(fences.len());
        self.take_completed(&fences)
    }

    /// Number of blocks handed out so far this turn.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// The chat-facing text: each complete block is swapped for a short
    /// confirmation line, unterminated fences stay as plain text.
    pub fn prose(&mut self, text: &str) -> String {
        let fences = scan(text, true);
        self.pin_names(&fences);

        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for (i, fence) in fences.iter().enumerate() {
            if !fence.closed {
                continue;
            }
            out.push_str(&text[cursor..fence.start]);
            out.push_str("✅ updated: ");
            out.push_str(&self.names[i]);
            cursor = fence.end;
        }
        out.push_str(&text[cursor..]);
        out.trim().to_string()
    }

    fn pin_names(&mut self, fences: &[Fence]) {
        for fence in fences.iter().skip(self.names.len()) {
            let name = match &fence.info.name {
                Some(name) => name.clone(),
                None => {
                    self.counter += 1;
                    fallback_name(&fence.info.language, self.counter)
                }
            };
            self.names.push(name);
        }
    }

    fn take_completed(&mut self, fences: &[Fence]) -> Vec<ParsedBlock> {
        let mut completed = Vec::new();
        for (i, fence) in fences.iter().enumerate().skip(self.emitted) {
            // Only the last fence can be open, so closed fences form a prefix.
            if !fence.closed {
                break;
            }
            let name = self.names[i].clone();
            let language = if fence.info.language.is_empty() {
                extension_of(&name).unwrap_or_default()
            } else {
                fence.info.language.clone()
            };
            completed.push(ParsedBlock {
                name,
                language,
                content: fence.content.clone(),
            });
            self.emitted = i + 1;
        }
        completed
    }
}

/// One-shot extraction from a finished response.
pub fn parse_blocks(text: &str) -> Vec<ParsedBlock> {
    BlockTracker::new().finish(text)
}

/// Name for a block that did not declare one.
pub fn fallback_name(language: &str, n: usize) -> String {
    match language {
        "html" | "htm" => format!("page{n}.html"),
        "css" => format!("style{n}.css"),
        "javascript" | "js" => format!("script{n}.js"),
        "" => format!("file{n}.txt"),
        other => format!("file{n}.{other}"),
    }
}

/// Walk the text line by line and collect every fence in document order.
///
/// With `at_end == false` an unterminated last line is treated as still
/// growing: it can neither open a fence nor close one.
fn scan(text: &str, at_end: bool) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut open: Option<(usize, FenceInfo, usize)> = None;
    let mut pos = 0;

    while pos < text.len() {
        let (line, next, terminated) = match text[pos..].find('\n') {
            Some(i) => (&text[pos..pos + i], pos + i + 1, true),
            None => (&text[pos..], text.len(), false),
        };
        let complete = terminated || at_end;
        let trimmed = line.trim();

        match &open {
            None => {
                if let Some(info) = trimmed.strip_prefix(FENCE) {
                    if !complete {
                        break;
                    }
                    open = Some((pos, parse_info(info), next));
                }
            }
            Some((start, info, body_start)) => {
                if is_closing_fence(trimmed) {
                    if !complete {
                        break;
                    }
                    let body = &text[*body_start..pos];
                    let body = body.strip_suffix('\n').unwrap_or(body);
                    let body = body.strip_suffix('\r').unwrap_or(body);
                    fences.push(Fence {
                        start: *start,
                        end: pos + line.len(),
                        info: info.clone(),
                        content: body.to_string(),
                        closed: true,
                    });
                    open = None;
                }
            }
        }
        pos = next;
    }

    if let Some((start, info, body_start)) = open {
        fences.push(Fence {
            start,
            end: text.len(),
            info,
            content: text[body_start.min(text.len())..].to_string(),
            closed: false,
        });
    }
    fences
}

fn is_closing_fence(trimmed: &str) -> bool {
    trimmed.len() >= FENCE.len() && trimmed.bytes().all(|b| b == b'`')
}

/// Parse the info string after an opening fence.
///
/// Accepted shapes: `html:index.html`, `html index.html`,
/// `html filename="index.html"`, `index.html`, `html`, or nothing.
fn parse_info(raw: &str) -> FenceInfo {
    let raw = raw.trim();
    if raw.is_empty() {
        return FenceInfo {
            language: String::new(),
            name: None,
        };
    }

    if let Some((lang, name)) = raw.split_once(':') {
        return FenceInfo {
            language: lang.trim().to_ascii_lowercase(),
            name: clean_name(name),
        };
    }

    let mut tokens = raw.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    if let Some(second) = tokens.next() {
        return FenceInfo {
            language: first.to_ascii_lowercase(),
            name: clean_name(second),
        };
    }

    // A lone token with an extension is a file name, not a language.
    if let Some(ext) = extension_of(first) {
        return FenceInfo {
            language: language_for_extension(&ext),
            name: clean_name(first),
        };
    }
    FenceInfo {
        language: first.to_ascii_lowercase(),
        name: None,
    }
}

fn clean_name(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw
        .strip_prefix("filename=")
        .or_else(|| raw.strip_prefix("file="))
        .unwrap_or(raw);
    let name = raw.trim_matches(|c| c == '"' || c == '\'').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn language_for_extension(ext: &str) -> String {
    match ext {
        "htm" => "html".to_string(),
        "js" | "mjs" => "javascript".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str, language: &str, content: &str) -> ParsedBlock {
        ParsedBlock {
            name: name.into(),
            language: language.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_single_block_in_three_chunks() {
        let mut tracker = BlockTracker::new();
        let mut text = String::new();
        let mut blocks = Vec::new();
        for chunk in ["```html:ind", "ex.html\n<h1>Hi</h", "1>\n```"] {
            text.push_str(chunk);
            blocks.extend(tracker.observe(&text).completed);
        }
        assert!(blocks.is_empty(), "closing fence without newline is not final yet");
        blocks.extend(tracker.finish(&text));
        assert_eq!(blocks, vec![block("index.html", "html", "<h1>Hi</h1>")]);
    }

    #[test]
    fn test_block_emitted_once_newline_arrives() {
        let mut tracker = BlockTracker::new();
        let text = "```css:style.css\nbody{}\n```\n";
        let obs = tracker.observe(text);
        assert_eq!(obs.opened, vec!["style.css".to_string()]);
        assert_eq!(obs.completed, vec![block("style.css", "css", "body{}")]);
        assert_eq!(tracker.observe(text), Observation::default());
        assert!(tracker.finish(text).is_empty());
    }

    #[test]
    fn test_incremental_emits_each_block_exactly_once() {
        let full = "Here you go.\n\n```css:style.css\nbody { color: red; }\n```\n\
                    Now the page:\n```html:index.html\n<link href=\"style.css\">\n<p>é</p>\n```\n\
                    And a script:\n```js\nconsole.log(1);\n```\nDone!";
        let mut tracker = BlockTracker::new();
        let mut text = String::new();
        let mut emitted = Vec::new();
        for ch in full.chars() {
            text.push(ch);
            for b in tracker.observe(&text).completed {
                let closed_fences = text.matches("\n```\n").count();
                emitted.push(b);
                assert!(emitted.len() <= closed_fences, "emitted before closing fence");
            }
        }
        emitted.extend(tracker.finish(&text));
        assert_eq!(
            emitted,
            vec![
                block("style.css", "css", "body { color: red; }"),
                block("index.html", "html", "<link href=\"style.css\">\n<p>é</p>"),
                block("script1.js", "js", "console.log(1);"),
            ]
        );
        assert_eq!(emitted, parse_blocks(full));
    }

    #[test]
    fn test_unterminated_fence_is_never_emitted() {
        let text = "Working on it\n```html\n<h1>";
        let mut tracker = BlockTracker::new();
        assert!(tracker.observe(text).completed.is_empty());
        assert!(tracker.finish(text).is_empty());
        assert_eq!(tracker.prose(text), text);
    }

    #[test]
    fn test_zero_blocks_is_plain_commentary() {
        let text = "Just some advice, no code.";
        assert!(parse_blocks(text).is_empty());
        assert_eq!(BlockTracker::new().prose(text), text);
    }

    #[test]
    fn test_fallback_names_share_one_counter() {
        let text = "```html\n<p>a</p>\n```\n```css\np{}\n```\n```javascript\nx()\n```\n\
                    ```python\nprint(1)\n```\n```\nraw\n```\n";
        let names: Vec<String> = parse_blocks(text).into_iter().map(|b| b.name).collect();
        assert_eq!(
            names,
            vec!["page1.html", "style2.css", "script3.js", "file4.python", "file5.txt"]
        );
    }

    #[test]
    fn test_fallback_names_are_pinned_across_rescans() {
        let mut tracker = BlockTracker::new();
        let mut text = String::from("```html\n<p>first</p>\n");
        assert!(tracker.observe(&text).completed.is_empty());
        text.push_str("```\n```css:main.css\na{}\n```\n```html\n<p>two</p>\n```\n");
        let names: Vec<String> = tracker
            .observe(&text)
            .completed
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["page1.html", "main.css", "page2.html"]);
        assert_eq!(tracker.emitted(), 3);
    }

    #[test]
    fn test_info_string_shapes() {
        let text = "```html index.html\na\n```\n```index.html\nb\n```\n\
                    ```js:src/app.js\nc\n```\n```html filename=\"about.html\"\nd\n```\n";
        let blocks = parse_blocks(text);
        assert_eq!(
            blocks,
            vec![
                block("index.html", "html", "a"),
                block("index.html", "html", "b"),
                block("src/app.js", "js", "c"),
                block("about.html", "html", "d"),
            ]
        );
    }

    #[test]
    fn test_inner_fence_with_info_is_body() {
        let text = "```md:README.md\n# Title\n```rust\n```\n";
        let blocks = parse_blocks(text);
        assert_eq!(blocks, vec![block("README.md", "md", "# Title\n```rust")]);
    }

    #[test]
    fn test_provisional_names_announced_once() {
        let mut tracker = BlockTracker::new();
        let obs = tracker.observe("Sure.\n```html:index.html\n<h1>");
        assert_eq!(obs.opened, vec!["index.html".to_string()]);
        assert!(obs.completed.is_empty());
        let obs = tracker.observe("Sure.\n```html:index.html\n<h1>Hi");
        assert!(obs.opened.is_empty());
        // An opening line still streaming is not announced yet.
        let obs = tracker.observe("Sure.\n```html:index.html\n<h1>Hi\n```\n```css:sty");
        assert!(obs.opened.is_empty());
        assert_eq!(obs.completed.len(), 1);
    }

    #[test]
    fn test_prose_replaces_blocks() {
        let text = "Updating two files.\n```css:style.css\np{}\n```\nthen\n```html\n<p></p>\n```\nEnjoy!";
        let mut tracker = BlockTracker::new();
        assert_eq!(
            tracker.prose(text),
            "Updating two files.\n✅ updated: style.css\nthen\n✅ updated: page1.html\nEnjoy!"
        );
    }

    #[test]
    fn test_crlf_bodies() {
        let text = "```css:a.css\r\nx{}\r\n```\r\n";
        assert_eq!(parse_blocks(text), vec![block("a.css", "css", "x{}")]);
    }
}
