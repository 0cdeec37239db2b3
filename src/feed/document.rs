//! RSS 2.0 document schema.
//!
//! Only the `<rss><channel>` shape is supported. Missing elements come back as
//! empty strings and unknown elements are ignored. Elements in any XML
//! namespace (`<atom:link>`, `<media:title>`, `<dc:creator>`) belong to
//! extensions and are skipped whole, so they never shadow the plain RSS
//! element of the same local name.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::borrow::Cow;
use thiserror::Error;

/// The body could not be read as an RSS document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Malformed XML: {0}")]
    Xml(String),
    #[error("Expected an <rss> root element, found <{0}>")]
    NotRss(String),
    #[error("Document has no root element")]
    Empty,
    #[error("Document ended inside <{0}>")]
    Truncated(String),
}

fn xml_error(e: impl std::fmt::Display) -> DocumentError {
    DocumentError::Xml(e.to_string())
}

/// A fetched syndication document. Lives for one fetch-parse cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub items: Vec<Entry>,
}

/// One `<item>`, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: String,
}

/// Which text field an element path lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemPubDate,
}

impl Field {
    fn at(path: &[String]) -> Option<Field> {
        let names: Vec<&str> = path.iter().map(String::as_str).collect();
        match names.as_slice() {
            ["rss", "channel", "title"] => Some(Field::ChannelTitle),
            ["rss", "channel", "link"] => Some(Field::ChannelLink),
            ["rss", "channel", "description"] => Some(Field::ChannelDescription),
            ["rss", "channel", "item", "title"] => Some(Field::ItemTitle),
            ["rss", "channel", "item", "link"] => Some(Field::ItemLink),
            ["rss", "channel", "item", "description"] => Some(Field::ItemDescription),
            ["rss", "channel", "item", "pubDate"] => Some(Field::ItemPubDate),
            _ => None,
        }
    }
}

fn is_item(path: &[String]) -> bool {
    path.len() == 3 && path[0] == "rss" && path[1] == "channel" && path[2] == "item"
}

impl Document {
    /// Parse an XML body and unescape its human-readable text.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::Xml`] - not well-formed, or an undeclared entity
    /// - [`DocumentError::NotRss`] - the root element is not an unprefixed `<rss>`
    /// - [`DocumentError::Empty`] / [`DocumentError::Truncated`] - no root, or
    ///   the body stops before the root closes
    pub fn from_xml(xml: &str) -> Result<Self, DocumentError> {
        let mut reader = NsReader::from_str(xml);
        let mut document = Document::default();
        // Unprefixed element names from the root down to the current element
        let mut path: Vec<String> = Vec::new();
        let mut text = String::new();
        let mut seen_root = false;

        loop {
            let (foreign, event) = match reader.read_resolved_event() {
                Ok((ns, event)) => (!matches!(ns, ResolveResult::Unbound), event),
                Err(e) => return Err(xml_error(e)),
            };

            match event {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if path.is_empty() {
                        if seen_root {
                            return Err(DocumentError::Xml(format!(
                                "second root element <{}>",
                                name
                            )));
                        }
                        if foreign || name != "rss" {
                            return Err(DocumentError::NotRss(name));
                        }
                        seen_root = true;
                    } else if foreign {
                        reader.read_to_end(e.name()).map_err(xml_error)?;
                        continue;
                    }

                    path.push(name);
                    if is_item(&path) {
                        document.channel.items.push(Entry::default());
                    }
                    if Field::at(&path).is_some() {
                        text.clear();
                    }
                }
                Event::Empty(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    if path.is_empty() {
                        if foreign || name != "rss" || seen_root {
                            return Err(DocumentError::NotRss(name));
                        }
                        seen_root = true;
                        continue;
                    }
                    if foreign {
                        continue;
                    }
                    path.push(name);
                    if is_item(&path) {
                        document.channel.items.push(Entry::default());
                    }
                    path.pop();
                }
                Event::Text(e) => {
                    if !path.is_empty() {
                        text.push_str(&e.unescape().map_err(xml_error)?);
                    }
                }
                Event::CData(e) => {
                    if !path.is_empty() {
                        text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::End(_) => {
                    if let Some(field) = Field::at(&path) {
                        document.store(field, text.trim());
                        text.clear();
                    }
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = path.last() {
            return Err(DocumentError::Truncated(open.clone()));
        }
        if !seen_root {
            return Err(DocumentError::Empty);
        }

        document.unescape_text();
        Ok(document)
    }

    fn store(&mut self, field: Field, value: &str) {
        let channel = &mut self.channel;
        let slot = match field {
            Field::ChannelTitle => &mut channel.title,
            Field::ChannelLink => &mut channel.link,
            Field::ChannelDescription => &mut channel.description,
            item_field => {
                let Some(entry) = channel.items.last_mut() else {
                    return;
                };
                match item_field {
                    Field::ItemTitle => &mut entry.title,
                    Field::ItemLink => &mut entry.link,
                    Field::ItemDescription => &mut entry.description,
                    _ => &mut entry.pub_date,
                }
            }
        };
        *slot = value.to_string();
    }

    /// HTML-unescape channel title/description and each item's
    /// title/description. Called exactly once per fetched document.
    fn unescape_text(&mut self) {
        let channel = &mut self.channel;
        unescape_in_place(&mut channel.title);
        unescape_in_place(&mut channel.description);
        for entry in &mut channel.items {
            unescape_in_place(&mut entry.title);
            unescape_in_place(&mut entry.description);
        }
    }
}

fn unescape_in_place(field: &mut String) {
    // Borrowed means nothing needed decoding
    if let Cow::Owned(decoded) = html_escape::decode_html_entities(field.as_str()) {
        *field = decoded;
    }
}
