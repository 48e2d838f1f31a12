use crate::catalog::PageMetadata;
use crate::util::strip_control_chars;

/// Title used when a page has neither `og:title` nor `<title>`.
pub const NO_TITLE: &str = "No Title";

/// Extracts social-preview metadata from an HTML document.
///
/// Reads the first non-empty `og:title`, `og:description` and `og:image`
/// from `<meta>` tags (matched on `property` or `name`). The title falls back
/// to `<title>`, then to [`NO_TITLE`]. A relative image is resolved against
/// `page_url`. Uses plain string scanning, no HTML parser.
pub fn extract_metadata(html: &str, page_url: &str) -> PageMetadata {
    let mut og_title = None;
    let mut og_description = None;
    let mut og_image = None;

    for attrs in meta_tags(html) {
        let key = attrs
            .iter()
            .find(|(name, _)| name == "property" || name == "name")
            .map(|(_, value)| value.to_ascii_lowercase());
        let content = attrs
            .iter()
            .find(|(name, _)| name == "content")
            .map(|(_, value)| clean_text(value))
            .filter(|value| !value.is_empty());

        let (Some(key), Some(content)) = (key, content) else {
            continue;
        };
        let slot = match key.as_str() {
            "og:title" => &mut og_title,
            "og:description" => &mut og_description,
            "og:image" => &mut og_image,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(content);
        }
    }

    let title = og_title
        .or_else(|| title_element(html))
        .unwrap_or_else(|| NO_TITLE.to_owned());

    PageMetadata {
        title,
        description: og_description.unwrap_or_default(),
        preview_image: og_image
            .map(|href| resolve_url(&href, page_url))
            .unwrap_or_default(),
    }
}

/// Attribute lists of every `<meta ...>` tag, in document order.
fn meta_tags(html: &str) -> Vec<Vec<(String, String)>> {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut tags = Vec::new();
    let mut search_from = 0;

    while let Some(found) = lower[search_from..].find("<meta") {
        let start = search_from + found + "<meta".len();
        // `<metadata>` and friends are not meta tags.
        if !lower[start..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_whitespace() || c == '/' || c == '>')
        {
            search_from = start;
            continue;
        }
        let Some(end) = find_tag_end(&html[start..]) else {
            break;
        };
        tags.push(parse_attributes(&html[start..start + end]));
        search_from = start + end + 1;
    }

    tags
}

/// Offset of the `>` closing a tag, skipping `>` inside quoted values.
fn find_tag_end(rest: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in rest.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parses `name="value" name='value' name=value flag` into lowercase-name
/// pairs. Values keep their case.
fn parse_attributes(body: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = body.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| c.is_whitespace() || *c == '/').is_some() {}
        let Some(&(name_start, _)) = chars.peek() else {
            break;
        };

        let mut name_end = body.len();
        while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || c == '=' || c == '/' {
                name_end = i;
                break;
            }
            chars.next();
        }
        let name = body[name_start..name_end].to_ascii_lowercase();

        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        if chars.next_if(|(_, c)| *c == '=').is_none() {
            if !name.is_empty() {
                attrs.push((name, String::new()));
            }
            continue;
        }
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}

        let value = match chars.peek().copied() {
            Some((i, q @ ('"' | '\''))) => {
                chars.next();
                let start = i + 1;
                let mut end = body.len();
                for (j, c) in chars.by_ref() {
                    if c == q {
                        end = j;
                        break;
                    }
                }
                &body[start..end]
            }
            Some((start, _)) => {
                let mut end = body.len();
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_whitespace() {
                        end = j;
                        break;
                    }
                    chars.next();
                }
                &body[start..end]
            }
            None => "",
        };

        if !name.is_empty() {
            attrs.push((name, value.to_owned()));
        }
    }

    attrs
}

/// Inner text of the first `<title>` element, if non-empty.
fn title_element(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = open + find_tag_end(&html[open..])? + 1;
    let content_end = content_start + lower[content_start..].find("</title")?;
    let title = clean_text(&html[content_start..content_end]);
    (!title.is_empty()).then_some(title)
}

/// Decodes entities, strips control characters, collapses whitespace.
fn clean_text(raw: &str) -> String {
    let decoded = decode_entities(raw);
    strip_control_chars(&decoded)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes the named entities pages commonly put in meta tags plus numeric
/// references. Unknown entities are left as written. Single pass, so
/// `&amp;lt;` becomes `&lt;`.
pub(crate) fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&after[..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &after[semi + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let hex = numeric
            .strip_prefix('x')
            .or_else(|| numeric.strip_prefix('X'));
        let code = match hex {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    }
}

/// Resolves a possibly relative URL against the page URL.
fn resolve_url(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_owned();
    }

    // SEC-017: protocol-relative hrefs go through the URL parser.
    if href.starts_with("//") {
        if let Ok(parsed) = url::Url::parse(&format!("https:{}", href)) {
            return parsed.to_string();
        }
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(href) {
            return resolved.to_string();
        }
    }

    href.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = "https://news.example.com/story/42";

    #[test]
    fn test_open_graph_tags() {
        let html = r#"<html><head>
            <title>Fallback title</title>
            <meta property="og:title" content="Snow leopard spotted">
            <meta property="og:description" content='Rare sighting in Ladakh'>
            <meta property="og:image" content="https://cdn.example.com/leopard.jpg" />
        </head></html>"#;

        assert_eq!(
            extract_metadata(html, PAGE),
            PageMetadata {
                title: "Snow leopard spotted".into(),
                description: "Rare sighting in Ladakh".into(),
                preview_image: "https://cdn.example.com/leopard.jpg".into(),
            }
        );
    }

    #[test]
    fn test_attribute_order_and_name_attribute() {
        let html = r#"<META content="Reordered" NAME="og:title">"#;
        assert_eq!(extract_metadata(html, PAGE).title, "Reordered");
    }

    #[test]
    fn test_title_element_fallback() {
        let html = "<head><title>\n  Tiger census &amp; results\n</title></head>";
        let meta = extract_metadata(html, PAGE);
        assert_eq!(meta.title, "Tiger census & results");
        assert_eq!(meta.description, "");
        assert_eq!(meta.preview_image, "");
    }

    #[test]
    fn test_no_title_sentinel() {
        assert_eq!(extract_metadata("<p>bare</p>", PAGE).title, NO_TITLE);
        assert_eq!(extract_metadata("", PAGE).title, NO_TITLE);
    }

    #[test]
    fn test_empty_og_title_falls_back() {
        let html = r#"<meta property="og:title" content="  "><title>Real</title>"#;
        assert_eq!(extract_metadata(html, PAGE).title, "Real");
    }

    #[test]
    fn test_first_tag_wins() {
        let html = r#"<meta property="og:title" content="First">
                      <meta property="og:title" content="Second">"#;
        assert_eq!(extract_metadata(html, PAGE).title, "First");
    }

    #[test]
    fn test_relative_image_resolved() {
        let html = r#"<meta property="og:image" content="/img/cover.png">"#;
        assert_eq!(
            extract_metadata(html, PAGE).preview_image,
            "https://news.example.com/img/cover.png"
        );

        let html = r#"<meta property="og:image" content="//cdn.example.com/a.png">"#;
        assert_eq!(
            extract_metadata(html, PAGE).preview_image,
            "https://cdn.example.com/a.png"
        );
    }

    #[test]
    fn test_quoted_gt_inside_content() {
        let html = r#"<meta property="og:description" content="a > b"><meta property="og:title" content="T">"#;
        let meta = extract_metadata(html, PAGE);
        assert_eq!(meta.description, "a > b");
        assert_eq!(meta.title, "T");
    }

    #[test]
    fn test_control_chars_stripped() {
        let html = "<meta property=\"og:title\" content=\"Evil\x1b[31m title\">";
        let meta = extract_metadata(html, PAGE);
        assert!(!meta.title.contains('\x1b'));
    }

    #[test]
    fn test_metadata_tag_is_not_meta() {
        let html = r#"<metadata property="og:title" content="Nope"></metadata>"#;
        assert_eq!(extract_metadata(html, PAGE).title, NO_TITLE);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&lt;b&gt; &quot;x&quot; &#39;y&apos;"), "<b> \"x\" 'y'");
        assert_eq!(decode_entities("&#8212; &#x2014;"), "\u{2014} \u{2014}");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("AT&T and &unknown; &"), "AT&T and &unknown; &");
    }

    #[test]
    fn test_unquoted_attribute_values() {
        let attrs = parse_attributes(" property=og:title content=Plain");
        assert_eq!(
            attrs,
            vec![
                ("property".to_owned(), "og:title".to_owned()),
                ("content".to_owned(), "Plain".to_owned()),
            ]
        );
    }
}
