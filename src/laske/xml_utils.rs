use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::Decimal;
use std::io::Cursor;

use crate::core::BillingError;
use crate::core::money::round_cents;

pub type XmlResult = Result<String, BillingError>;

fn xml_io(e: std::io::Error) -> BillingError {
    BillingError::Xml(format!("XML write error: {e}"))
}

/// Indented XML writer with a lower-case `utf-8` declaration.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    pub fn new() -> Result<Self, BillingError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_io)?;
        Ok(Self { writer })
    }

    pub fn into_string(self) -> Result<String, BillingError> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| BillingError::Xml(format!("XML UTF-8 error: {e}")))
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, BillingError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, BillingError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_io)?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, BillingError> {
        self.start_element(name)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_io)?;
        self.end_element(name)
    }

    /// Write `name` only when a value is present; an empty value is written
    /// as an empty element.
    pub fn optional_element(
        &mut self,
        name: &str,
        text: Option<&str>,
    ) -> Result<&mut Self, BillingError> {
        match text {
            Some(text) => self.text_element(name, text),
            None => Ok(self),
        }
    }
}

/// Amount with two decimals and a decimal comma, e.g. `1234,50`.
pub fn format_net_price(amount: Decimal) -> String {
    let mut rounded = round_cents(amount);
    rounded.rescale(2);
    rounded.to_string().replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn net_price_cases() {
        assert_eq!(format_net_price(dec!(100)), "100,00");
        assert_eq!(format_net_price(dec!(1500.5)), "1500,50");
        assert_eq!(format_net_price(dec!(33.335)), "33,34");
        assert_eq!(format_net_price(dec!(0)), "0,00");
    }

    #[test]
    fn optional_elements() {
        let mut w = XmlWriter::new().unwrap();
        w.start_element("Root").unwrap();
        w.optional_element("Missing", None).unwrap();
        w.optional_element("Empty", Some("")).unwrap();
        w.text_element("Value", "a & b").unwrap();
        w.end_element("Root").unwrap();
        let xml = w.into_string().unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(!xml.contains("Missing"));
        assert!(xml.contains("<Empty></Empty>"));
        assert!(xml.contains("<Value>a &amp; b</Value>"));
    }
}
