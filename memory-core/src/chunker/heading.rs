//! Heading-aware chunking for structured markup (markdown/ReST): splits
//! at heading boundaries and carries a breadcrumb of ancestor headings
//! into each chunk's metadata.

use super::ChunkBudget;

/// Whether `content` contains markdown-style ATX headings (`# `, `## `,
/// ...) or a ReST-style underline heading.
#[must_use]
pub fn looks_like_structured_markup(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.trim_start().starts_with('#') && line.trim_start().contains(' '))
}

fn heading_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if trimmed.as_bytes().get(level) == Some(&b' ') {
        Some(level)
    } else {
        None
    }
}

/// Split at heading boundaries, returning `(chunk_text, breadcrumb)`
/// pairs where `breadcrumb` is the stack of ancestor heading titles (not
/// including the chunk's own leading heading, which is already in
/// `chunk_text`).
#[must_use]
pub fn split(content: &str, budget: ChunkBudget) -> Vec<(String, Vec<String>)> {
    let mut sections: Vec<(String, Vec<String>)> = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current = String::new();
    let mut current_breadcrumb: Vec<String> = Vec::new();

    for line in content.lines() {
        if let Some(level) = heading_level(line) {
            if !current.trim().is_empty() {
                sections.push((std::mem::take(&mut current), current_breadcrumb.clone()));
            }
            while stack.last().is_some_and(|(l, _)| *l >= level) {
                stack.pop();
            }
            current_breadcrumb = stack.iter().map(|(_, title)| title.clone()).collect();
            let title = line.trim_start().trim_start_matches('#').trim().to_string();
            stack.push((level, title));
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push((current, current_breadcrumb));
    }
    if sections.is_empty() {
        return vec![(content.to_string(), Vec::new())];
    }

    // Merge undersized adjacent sections that share the same breadcrumb,
    // and hard-split any section that still exceeds the max budget.
    let mut merged: Vec<(String, Vec<String>)> = Vec::new();
    for (text, breadcrumb) in sections {
        if let Some((last_text, last_breadcrumb)) = merged.last_mut() {
            if super::estimate_tokens(last_text) < budget.min_chunk_tokens
                && *last_breadcrumb == breadcrumb
            {
                last_text.push_str(&text);
                continue;
            }
        }
        merged.push((text, breadcrumb));
    }

    let mut out = Vec::new();
    for (text, breadcrumb) in merged {
        if super::estimate_tokens(&text) <= budget.max_chunk_tokens {
            out.push((text, breadcrumb));
        } else {
            for piece in super::prose::split(&text, budget) {
                out.push((piece, breadcrumb.clone()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_markdown_headings() {
        assert!(looks_like_structured_markup("# Title\n\nbody"));
        assert!(!looks_like_structured_markup("just some text, no headings"));
    }

    #[test]
    fn breadcrumb_tracks_ancestors() {
        let doc = "# Top\n\nintro\n\n## Child\n\nchild body\n\n### Grandchild\n\ndeep body\n";
        let sections = split(doc, ChunkBudget::default());
        let grandchild = sections
            .iter()
            .find(|(text, _)| text.contains("deep body"))
            .expect("grandchild section present");
        assert_eq!(grandchild.1, vec!["Top".to_string(), "Child".to_string()]);
    }

    #[test]
    fn splits_at_each_top_level_heading() {
        let doc = "# One\n\nbody one\n\n# Two\n\nbody two\n";
        let sections = split(doc, ChunkBudget::default());
        assert!(sections.iter().any(|(t, _)| t.contains("body one")));
        assert!(sections.iter().any(|(t, _)| t.contains("body two")));
    }
}
