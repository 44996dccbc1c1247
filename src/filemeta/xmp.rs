//! XMP packets (JPEG APP1 `http://ns.adobe.com/xap/1.0/`).
//!
//! Only `dc:subject` and `xmp:Rating` are interpreted. Rewriting streams the
//! existing packet through unchanged apart from those two properties, which
//! are dropped wherever they occur and written afresh into the first
//! `rdf:Description`.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;

use super::MetadataError;

pub const XMP_SIGNATURE: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";

const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_XMP: &str = "http://ns.adobe.com/xap/1.0/";

const EMPTY_PACKET: &str = concat!(
    "<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n",
    "<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">",
    "<rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">",
    "<rdf:Description rdf:about=\"\"/>",
    "</rdf:RDF>",
    "</x:xmpmeta>\n",
    "<?xpacket end=\"w\"?>",
);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpFields {
    pub subject: Option<Vec<String>>,
    pub rating: Option<i64>,
}

fn is_subject(name: &[u8]) -> bool {
    name == b"dc:subject"
}

fn is_rating(name: &[u8]) -> bool {
    name == b"xmp:Rating" || name == b"xap:Rating"
}

pub fn parse(packet: &str) -> Result<XmpFields, MetadataError> {
    let mut reader = Reader::from_str(packet);
    reader.trim_text(true);

    let mut fields = XmpFields::default();
    let mut in_subject = false;
    let mut in_item = false;
    let mut in_rating = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.name();
                if is_subject(name.as_ref()) {
                    in_subject = true;
                    fields.subject.get_or_insert_with(Vec::new);
                } else if in_subject && name.as_ref() == b"rdf:li" {
                    in_item = true;
                } else if is_rating(name.as_ref()) {
                    in_rating = true;
                }
                read_rating_attribute(&e, &mut fields)?;
            }
            Event::Empty(e) => {
                if is_subject(e.name().as_ref()) {
                    fields.subject.get_or_insert_with(Vec::new);
                }
                read_rating_attribute(&e, &mut fields)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                if in_item {
                    if let Some(subject) = fields.subject.as_mut() {
                        subject.push(text.into_owned());
                    }
                } else if in_rating {
                    fields.rating = parse_rating(&text);
                }
            }
            Event::End(e) => {
                let name = e.name();
                if is_subject(name.as_ref()) {
                    in_subject = false;
                } else if name.as_ref() == b"rdf:li" {
                    in_item = false;
                } else if is_rating(name.as_ref()) {
                    in_rating = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(fields)
}

/// Produce a packet carrying `subject` and `rating`, starting from `packet`
/// (or an empty packet). An empty subject or `None` rating removes it.
pub fn rewrite(packet: Option<&str>, subject: &[String], rating: Option<i64>) -> Result<String, MetadataError> {
    let mut reader = Reader::from_str(packet.unwrap_or(EMPTY_PACKET));
    let mut writer = Writer::new(Vec::new());
    let mut skip_depth = 0usize;
    let mut injected = false;

    loop {
        let event = reader.read_event()?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(e) if is_subject(e.name().as_ref()) || is_rating(e.name().as_ref()) => {
                skip_depth = 1;
            }
            Event::Empty(e) if is_subject(e.name().as_ref()) || is_rating(e.name().as_ref()) => {}
            Event::Start(e) if e.name().as_ref() == b"rdf:Description" => {
                let start = description_start(&e, !injected)?;
                writer.write_event(Event::Start(start))?;
                if !injected {
                    write_properties(&mut writer, subject, rating)?;
                    injected = true;
                }
            }
            Event::Empty(e) if e.name().as_ref() == b"rdf:Description" => {
                let start = description_start(&e, !injected)?;
                if injected {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    let end = start.to_end().into_owned();
                    writer.write_event(Event::Start(start))?;
                    write_properties(&mut writer, subject, rating)?;
                    writer.write_event(Event::End(end))?;
                    injected = true;
                }
            }
            Event::End(e) if !injected && e.name().as_ref() == b"rdf:RDF" => {
                let mut start = BytesStart::new("rdf:Description");
                start.push_attribute(("rdf:about", ""));
                let start = description_start(&start, true)?;
                writer.write_event(Event::Start(start))?;
                write_properties(&mut writer, subject, rating)?;
                writer.write_event(Event::End(BytesEnd::new("rdf:Description")))?;
                writer.write_event(Event::End(e))?;
                injected = true;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|e| MetadataError::Corrupt(e.to_string()))
}

/// Copy of an `rdf:Description` start tag without a rating attribute,
/// optionally declaring the namespaces of the properties about to be written.
fn description_start(e: &BytesStart<'_>, declare: bool) -> Result<BytesStart<'static>, MetadataError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    let mut has_dc = false;
    let mut has_xmp = false;

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.as_ref() {
            key if is_rating(key) => continue,
            b"xmlns:dc" => has_dc = true,
            b"xmlns:xmp" => has_xmp = true,
            _ => {}
        }
        start.push_attribute(attr);
    }

    if declare {
        if !has_dc {
            start.push_attribute(("xmlns:dc", NS_DC));
        }
        if !has_xmp {
            start.push_attribute(("xmlns:xmp", NS_XMP));
        }
    }
    Ok(start)
}

fn write_properties<W: Write>(
    writer: &mut Writer<W>,
    subject: &[String],
    rating: Option<i64>,
) -> Result<(), MetadataError> {
    if !subject.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("dc:subject")))?;
        writer.write_event(Event::Start(BytesStart::new("rdf:Bag")))?;
        for keyword in subject {
            writer.write_event(Event::Start(BytesStart::new("rdf:li")))?;
            writer.write_event(Event::Text(BytesText::new(keyword)))?;
            writer.write_event(Event::End(BytesEnd::new("rdf:li")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("rdf:Bag")))?;
        writer.write_event(Event::End(BytesEnd::new("dc:subject")))?;
    }

    if let Some(rating) = rating {
        let value = rating.to_string();
        writer.write_event(Event::Start(BytesStart::new("xmp:Rating")))?;
        writer.write_event(Event::Text(BytesText::new(&value)))?;
        writer.write_event(Event::End(BytesEnd::new("xmp:Rating")))?;
    }

    Ok(())
}

fn read_rating_attribute(e: &BytesStart<'_>, fields: &mut XmpFields) -> Result<(), MetadataError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if is_rating(attr.key.as_ref()) {
            fields.rating = parse_rating(&attr.unescape_value()?);
        }
    }
    Ok(())
}

/// Ratings are integers, but some writers store "4.0".
fn parse_rating(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|r| r.round() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHTROOM_STYLE: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmp:Rating="3"
    photoshop:City="Seville">
   <dc:creator><rdf:Seq><rdf:li>Jane Smith</rdf:li></rdf:Seq></dc:creator>
   <dc:subject>
    <rdf:Bag>
     <rdf:li>People|Family|Smith</rdf:li>
     <rdf:li>Places|Spain &amp; Portugal</rdf:li>
    </rdf:Bag>
   </dc:subject>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_parse_attribute_rating_and_subject() {
        let fields = parse(LIGHTROOM_STYLE).unwrap();
        assert_eq!(fields.rating, Some(3));
        assert_eq!(
            fields.subject,
            Some(strings(&["People|Family|Smith", "Places|Spain & Portugal"]))
        );
    }

    #[test]
    fn test_parse_element_rating() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <rdf:Description rdf:about="" xmlns:xmp="http://ns.adobe.com/xap/1.0/"><xmp:Rating>4.0</xmp:Rating></rdf:Description>
            </rdf:RDF></x:xmpmeta>"#;
        let fields = parse(packet).unwrap();
        assert_eq!(fields.rating, Some(4));
        assert_eq!(fields.subject, None);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse("<x:xmpmeta><rdf:RDF></x:xmpmeta>").is_err());
    }

    #[test]
    fn test_rewrite_from_nothing() {
        let packet = rewrite(None, &strings(&["Events|Wedding"]), Some(5)).unwrap();
        assert!(packet.starts_with("<?xpacket begin="));
        let fields = parse(&packet).unwrap();
        assert_eq!(fields.subject, Some(strings(&["Events|Wedding"])));
        assert_eq!(fields.rating, Some(5));
    }

    #[test]
    fn test_rewrite_replaces_owned_properties_only() {
        let packet = rewrite(Some(LIGHTROOM_STYLE), &strings(&["Other|Scanned"]), Some(1)).unwrap();

        let fields = parse(&packet).unwrap();
        assert_eq!(fields.subject, Some(strings(&["Other|Scanned"])));
        assert_eq!(fields.rating, Some(1));
        assert!(packet.contains(r#"photoshop:City="Seville""#));
        assert!(packet.contains("<rdf:li>Jane Smith</rdf:li>"));
        assert!(!packet.contains(r#"xmp:Rating="3""#));
        assert_eq!(packet.matches("xmlns:dc=").count(), 1);
    }

    #[test]
    fn test_rewrite_removes_when_empty() {
        let packet = rewrite(Some(LIGHTROOM_STYLE), &[], None).unwrap();
        let fields = parse(&packet).unwrap();
        assert_eq!(fields, XmpFields::default());
        assert!(packet.contains("dc:creator"));
    }

    #[test]
    fn test_rewrite_escapes_keywords() {
        let packet = rewrite(None, &strings(&["Places|Spain & <Portugal>"]), None).unwrap();
        assert!(packet.contains("Spain &amp; &lt;Portugal&gt;"));
        assert_eq!(
            parse(&packet).unwrap().subject,
            Some(strings(&["Places|Spain & <Portugal>"]))
        );
    }

    #[test]
    fn test_parse_rating_values() {
        assert_eq!(parse_rating(" 2 "), Some(2));
        assert_eq!(parse_rating("-1"), Some(-1));
        assert_eq!(parse_rating("3.6"), Some(4));
        assert_eq!(parse_rating("five"), None);
    }
}
