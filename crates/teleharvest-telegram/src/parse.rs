//! Extraction of posts from the `t.me/s/<channel>` preview markup.
//!
//! The preview renders each post as a `tgme_widget_message_wrap` block.
//! Blocks are located by their opening tag and each one is scanned for the
//! fields we keep; blocks without a `data-post` id are ignored.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use teleharvest_models::MediaInfo;

use crate::ChannelPost;

const BLOCK_MARKER: &str = "<div class=\"tgme_widget_message_wrap";

struct Patterns {
    post: Regex,
    time: Regex,
    text: Regex,
    views: Regex,
    reply: Regex,
    author: Regex,
    photo: Regex,
    document_title: Regex,
    line_break: Regex,
    tag: Regex,
    entity: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static regex");
        Patterns {
            post: re(r#"data-post="([^"/]+)/(\d+)""#),
            time: re(r#"<time[^>]*datetime="([^"]+)""#),
            text: re(r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#),
            views: re(r#"<span class="tgme_widget_message_views">([^<]+)</span>"#),
            reply: re(
                r#"class="tgme_widget_message_reply[^"]*"[^>]*href="[^"]*?/(\d+)(?:\?[^"]*)?""#,
            ),
            author: re(r#"(?s)<span class="tgme_widget_message_from_author"[^>]*>(.*?)</span>"#),
            photo: re(
                r#"tgme_widget_message_photo_wrap[^"]*"[^>]*style="[^"]*background-image:url\('([^']+)'\)"#,
            ),
            document_title: re(
                r#"(?s)<div class="tgme_widget_message_document_title[^"]*"[^>]*>(.*?)</div>"#,
            ),
            line_break: re(r"(?i)<br\s*/?>"),
            tag: re(r"(?s)<[^>]+>"),
            entity: re(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);"),
        }
    })
}

/// Parse every post on a preview page, in page order (oldest first).
pub fn parse_page(channel: &str, html: &str) -> Vec<ChannelPost> {
    let starts: Vec<usize> = html.match_indices(BLOCK_MARKER).map(|(i, _)| i).collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(html.len());
            parse_block(channel, &html[start..end])
        })
        .collect()
}

fn parse_block(channel: &str, block: &str) -> Option<ChannelPost> {
    let p = patterns();

    let post = p.post.captures(block)?;
    let id: i64 = post[2].parse().ok()?;

    let date = p
        .time
        .captures(block)
        .and_then(|c| DateTime::parse_from_rfc3339(&c[1]).ok())
        .map(|d| d.with_timezone(&Utc));

    let text = p
        .text
        .captures(block)
        .map(|c| html_to_text(&c[1]))
        .filter(|t| !t.is_empty());

    let views = p.views.captures(block).and_then(|c| parse_count(&c[1]));
    let reply_to_msg_id = p.reply.captures(block).and_then(|c| c[1].parse().ok());
    let author = p
        .author
        .captures(block)
        .map(|c| html_to_text(&c[1]))
        .filter(|a| !a.is_empty());

    let (media, media_url) = parse_media(block);

    Some(ChannelPost {
        id,
        channel: channel.to_string(),
        date,
        text,
        views,
        forwards: None,
        reply_to_msg_id,
        is_forward: block.contains("tgme_widget_message_forwarded_from"),
        author,
        media,
        media_url,
        raw_excerpt: block.chars().take(500).collect(),
    })
}

fn parse_media(block: &str) -> (Option<MediaInfo>, Option<String>) {
    let p = patterns();

    if let Some(c) = p.photo.captures(block) {
        return (Some(MediaInfo::Photo), Some(decode_entities(&c[1])));
    }
    if block.contains("tgme_widget_message_video_player") {
        return (Some(MediaInfo::Other("video".to_string())), None);
    }
    if let Some(c) = p.document_title.captures(block) {
        let file_name = html_to_text(&c[1]);
        let mime_type = guess_mime_type(&file_name).map(str::to_string);
        return (
            Some(MediaInfo::Document {
                mime_type,
                file_name: Some(file_name).filter(|n| !n.is_empty()),
            }),
            None,
        );
    }

    let other = [
        ("tgme_widget_message_voice", "voice"),
        ("tgme_widget_message_sticker", "sticker"),
        ("tgme_widget_message_poll", "poll"),
        ("tgme_widget_message_location", "geo"),
    ]
    .into_iter()
    .find(|(marker, _)| block.contains(marker))
    .map(|(_, kind)| MediaInfo::Other(kind.to_string()));

    (other, None)
}

/// Best-effort MIME type for a document from its file extension.
pub fn guess_mime_type(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

/// Convert a fragment of message markup to plain text.
fn html_to_text(fragment: &str) -> String {
    let p = patterns();
    let with_breaks = p.line_break.replace_all(fragment, "\n");
    let stripped = p.tag.replace_all(&with_breaks, "");
    decode_entities(&stripped).trim().to_string()
}

fn decode_entities(s: &str) -> String {
    patterns()
        .entity
        .replace_all(s, |c: &Captures| {
            let name = &c[1];
            let decoded = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| c[0].to_string(), String::from)
        })
        .into_owned()
}

/// Parse a view counter such as `845`, `1.2K`, or `3.4M`.
pub fn parse_count(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (number, multiplier) = match raw.chars().last()? {
        'K' | 'k' => (&raw[..raw.len() - 1], 1_000.0),
        'M' | 'm' => (&raw[..raw.len() - 1], 1_000_000.0),
        _ => (raw, 1.0),
    };
    let value: f64 = number.trim().parse().ok()?;
    Some((value * multiplier).round() as i64)
}
