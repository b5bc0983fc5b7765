use bytes::Bytes;
use klvdemux_frame::{decode_ber_length_slice, KlvPacket};
use tracing::{trace, warn};

use crate::config::ParserConfig;
use crate::dictionary::TagDictionary;
use crate::error::MalformedNesting;
use crate::item::{DecodedValue, ItemValue, MetadataItem, ParseStatus};

/// Splits packet values into metadata items.
#[derive(Debug, Clone, Copy, Default)]
pub struct KlvPacketParser {
    config: ParserConfig,
}

impl KlvPacketParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Lazily decode the items in `packet`'s value.
    pub fn parse<'d>(&self, packet: &KlvPacket, dictionary: &'d dyn TagDictionary) -> MetadataItems<'d> {
        self.parse_value(packet.value().clone(), dictionary)
    }

    /// Lazily decode a bare local-set value.
    pub fn parse_value<'d>(&self, value: Bytes, dictionary: &'d dyn TagDictionary) -> MetadataItems<'d> {
        MetadataItems::new(value, dictionary, self.config, 0)
    }
}

/// Iterator over the items of one packet value, in wire order.
///
/// Once it returns `None` it stays exhausted; [`MetadataItems::status`] then
/// says whether the whole value was consumed.
pub struct MetadataItems<'d> {
    data: Bytes,
    offset: usize,
    dictionary: &'d dyn TagDictionary,
    config: ParserConfig,
    depth: usize,
    status: ParseStatus,
    done: bool,
}

impl<'d> MetadataItems<'d> {
    fn new(data: Bytes, dictionary: &'d dyn TagDictionary, config: ParserConfig, depth: usize) -> Self {
        Self {
            data,
            offset: 0,
            dictionary,
            config,
            depth,
            status: ParseStatus::Complete,
            done: false,
        }
    }

    /// Framing status so far. Final once the iterator is exhausted.
    pub fn status(&self) -> &ParseStatus {
        &self.status
    }

    /// Bytes of the value consumed by emitted items.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Drain the remaining items and return them with the final status.
    pub fn finish(mut self) -> (Vec<MetadataItem>, ParseStatus) {
        let items: Vec<MetadataItem> = self.by_ref().collect();
        (items, self.status)
    }

    fn fail(&mut self, reason: MalformedNesting) -> Option<MetadataItem> {
        warn!(
            offset = self.offset,
            depth = self.depth,
            reason = %reason,
            "malformed local set; remaining items skipped"
        );
        self.status = ParseStatus::Partial {
            offset: self.offset,
            reason,
        };
        self.done = true;
        None
    }

    fn next_item(&mut self) -> Option<MetadataItem> {
        let remaining = &self.data[self.offset..];
        let Some(tag_len) = self.config.tag_form.tag_len(remaining) else {
            return self.fail(MalformedNesting::TruncatedTag);
        };
        let Some((length, length_len)) = decode_ber_length_slice(&remaining[tag_len..]) else {
            return self.fail(MalformedNesting::TruncatedLength);
        };

        let header = tag_len + length_len;
        let available = remaining.len() - header;
        let value_len = match usize::try_from(length) {
            Ok(value_len) if value_len <= available => value_len,
            _ => return self.fail(MalformedNesting::LengthOverrun { length, available }),
        };

        let start = self.offset;
        let tag = self.data.slice(start..start + tag_len);
        let raw = self.data.slice(start + header..start + header + value_len);
        self.offset = start + header + value_len;

        let tag_number = self.config.tag_form.tag_number(&tag);
        let value = self.decode(&tag, &raw, start);
        Some(MetadataItem {
            tag,
            tag_number,
            length,
            raw,
            value,
        })
    }

    fn decode(&self, tag: &[u8], raw: &Bytes, item_offset: usize) -> ItemValue {
        let Some(rule) = self.dictionary.lookup(tag) else {
            trace!(tag = %hex::encode_upper(tag), "unknown tag");
            return ItemValue::Unknown;
        };
        let name = rule.name().to_owned();

        if let Some(nested) = rule.nested() {
            let value = if self.depth + 1 >= self.config.max_depth {
                warn!(offset = item_offset, max_depth = self.config.max_depth, "local set nested too deep");
                DecodedValue::Set {
                    items: Vec::new(),
                    status: ParseStatus::Partial {
                        offset: 0,
                        reason: MalformedNesting::TooDeep {
                            max_depth: self.config.max_depth,
                        },
                    },
                }
            } else {
                let (items, status) =
                    MetadataItems::new(raw.clone(), nested, self.config, self.depth + 1).finish();
                DecodedValue::Set { items, status }
            };
            return ItemValue::Decoded { name, value };
        }

        match rule.decode(raw) {
            Ok(value) => ItemValue::Decoded { name, value },
            Err(error) => {
                trace!(tag = %hex::encode_upper(tag), error = %error, "decode rule rejected item");
                ItemValue::Invalid { name, error }
            }
        }
    }
}

impl Iterator for MetadataItems<'_> {
    type Item = MetadataItem;

    fn next(&mut self) -> Option<MetadataItem> {
        if self.done {
            return None;
        }
        if self.offset >= self.data.len() {
            self.done = true;
            return None;
        }
        self.next_item()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use klvdemux_frame::encode_ber_length;

    use super::*;
    use crate::dictionary::{Dictionary, EmptyDictionary};
    use crate::error::DecodeError;
    use crate::rules::{DecodeRule, Rule};
    use crate::tag::TagForm;

    fn local_set(items: &[(u8, &[u8])]) -> Bytes {
        let mut buf = BytesMut::new();
        for (tag, value) in items {
            buf.extend_from_slice(&[*tag]);
            encode_ber_length(value.len() as u64, &mut buf);
            buf.extend_from_slice(value);
        }
        buf.freeze()
    }

    fn packet(value: Bytes) -> KlvPacket {
        KlvPacket::new(vec![0x06; 16], value)
    }

    fn uas_dictionary() -> Dictionary {
        let mut security = Dictionary::new();
        security.register_number(1, Rule::uint("Classification"));

        let mut dictionary = Dictionary::new();
        dictionary.register_number(2, Rule::uint("Precision Time Stamp"));
        dictionary.register_number(3, Rule::utf8("Mission ID"));
        dictionary.register_number(48, Rule::local_set("Security Local Set", security));
        dictionary
    }

    #[test]
    fn items_come_out_in_wire_order() {
        let value = local_set(&[
            (3, b"MISSION01"),
            (2, &[0x00, 0x04, 0x59, 0xF4, 0xA6, 0xAA, 0x4A, 0xA8]),
            (3, b"SECOND"),
        ]);
        let dictionary = uas_dictionary();
        let parser = KlvPacketParser::default();

        let (items, status) = parser.parse(&packet(value), &dictionary).finish();

        assert!(status.is_complete());
        let names: Vec<_> = items.iter().map(|item| item.name().unwrap()).collect();
        assert_eq!(names, ["Mission ID", "Precision Time Stamp", "Mission ID"]);
        assert_eq!(
            items[1].value,
            ItemValue::Decoded {
                name: "Precision Time Stamp".to_string(),
                value: DecodedValue::Unsigned(0x0004_59F4_A6AA_4AA8),
            }
        );
        assert_eq!(items[0].tag_number, Some(3));
        assert_eq!(items[0].length, 9);
    }

    #[test]
    fn unknown_tags_keep_raw_bytes() {
        let value = local_set(&[(0x41, &[1, 2, 3]), (3, b"M")]);
        let dictionary = uas_dictionary();

        let items: Vec<_> = KlvPacketParser::default()
            .parse(&packet(value), &dictionary)
            .collect();

        assert!(items[0].is_unknown());
        assert_eq!(items[0].raw.as_ref(), &[1, 2, 3]);
        assert_eq!(items[1].name(), Some("Mission ID"));
    }

    #[test]
    fn empty_dictionary_reports_everything_unknown() {
        let value = local_set(&[(1, &[0]), (2, &[])]);
        let items: Vec<_> = KlvPacketParser::default()
            .parse(&packet(value), &EmptyDictionary)
            .collect();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(MetadataItem::is_unknown));
        assert!(items[1].raw.is_empty());
    }

    #[test]
    fn failing_rule_yields_invalid_item_and_continues() {
        let value = local_set(&[(2, &[]), (3, b"ok")]);
        let dictionary = uas_dictionary();

        let (items, status) = KlvPacketParser::default()
            .parse(&packet(value), &dictionary)
            .finish();

        assert!(status.is_complete());
        assert!(matches!(
            &items[0].value,
            ItemValue::Invalid { error: DecodeError::BadWidth { actual: 0, .. }, .. }
        ));
        assert_eq!(items[1].name(), Some("Mission ID"));
    }

    #[test]
    fn length_overrun_truncates_with_partial_status() {
        let mut value = BytesMut::from(local_set(&[(3, b"AB")]).as_ref());
        value.extend_from_slice(&[0x02, 0x05, 0xAA, 0xBB]);

        let mut items = KlvPacketParser::default().parse(&packet(value.freeze()), &EmptyDictionary);
        assert!(items.next().is_some());
        assert!(items.next().is_none());
        assert!(items.next().is_none());

        assert_eq!(
            items.status(),
            &ParseStatus::Partial {
                offset: 4,
                reason: MalformedNesting::LengthOverrun {
                    length: 5,
                    available: 2,
                },
            }
        );
    }

    #[test]
    fn truncated_length_field() {
        let value = Bytes::from_static(&[0x01, 0x82, 0x01]);
        let (items, status) = KlvPacketParser::default()
            .parse_value(value, &EmptyDictionary)
            .finish();
        assert!(items.is_empty());
        assert_eq!(
            status,
            ParseStatus::Partial {
                offset: 0,
                reason: MalformedNesting::TruncatedLength,
            }
        );
    }

    #[test]
    fn truncated_fixed_tag() {
        let config = ParserConfig {
            tag_form: TagForm::Fixed(2),
            ..ParserConfig::default()
        };
        let value = Bytes::from_static(&[0x00, 0x01, 0x01, 0xFF, 0x07]);
        let (items, status) = KlvPacketParser::new(config)
            .parse_value(value, &EmptyDictionary)
            .finish();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tag.as_ref(), &[0x00, 0x01]);
        assert_eq!(
            status,
            ParseStatus::Partial {
                offset: 4,
                reason: MalformedNesting::TruncatedTag,
            }
        );
    }

    #[test]
    fn ber_oid_tags() {
        let config = ParserConfig {
            tag_form: TagForm::BerOid,
            ..ParserConfig::default()
        };
        let mut dictionary = Dictionary::new();
        dictionary.register_number(300, Rule::int("Far Tag"));

        let value = Bytes::from_static(&[0x82, 0x2C, 0x01, 0xFE, 0x05, 0x00]);
        let (items, status) = KlvPacketParser::new(config)
            .parse_value(value, &dictionary)
            .finish();

        assert!(status.is_complete());
        assert_eq!(items[0].tag_number, Some(300));
        assert_eq!(
            items[0].value,
            ItemValue::Decoded {
                name: "Far Tag".to_string(),
                value: DecodedValue::Signed(-2),
            }
        );
        assert_eq!(items[1].tag_number, Some(5));
        assert!(items[1].is_unknown());
    }

    #[test]
    fn nested_local_set_is_parsed_recursively() {
        let security = local_set(&[(1, &[0x03])]);
        let value = local_set(&[(48, security.as_ref()), (3, b"M")]);
        let dictionary = uas_dictionary();

        let (items, _) = KlvPacketParser::default()
            .parse(&packet(value), &dictionary)
            .finish();

        let ItemValue::Decoded {
            value: DecodedValue::Set { items: inner, status },
            ..
        } = &items[0].value
        else {
            panic!("expected nested set, got {:?}", items[0].value);
        };
        assert!(status.is_complete());
        assert_eq!(inner[0].name(), Some("Classification"));
        assert_eq!(
            inner[0].value,
            ItemValue::Decoded {
                name: "Classification".to_string(),
                value: DecodedValue::Unsigned(3),
            }
        );
    }

    #[test]
    fn malformed_nested_set_does_not_end_outer_sequence() {
        let value = local_set(&[(48, &[0x01, 0x09, 0x00]), (3, b"after")]);
        let dictionary = uas_dictionary();

        let (items, status) = KlvPacketParser::default()
            .parse(&packet(value), &dictionary)
            .finish();

        assert!(status.is_complete());
        assert_eq!(items.len(), 2);
        let ItemValue::Decoded {
            value: DecodedValue::Set { status: inner, .. },
            ..
        } = &items[0].value
        else {
            panic!("expected nested set");
        };
        assert!(!inner.is_complete());
    }

    #[test]
    fn nesting_depth_is_limited() {
        struct SelfNesting;

        impl DecodeRule for SelfNesting {
            fn name(&self) -> &str {
                "loop"
            }

            fn decode(&self, value: &Bytes) -> Result<DecodedValue, DecodeError> {
                Ok(DecodedValue::Bytes(value.clone()))
            }

            fn nested(&self) -> Option<&dyn TagDictionary> {
                Some(&LoopDictionary)
            }
        }

        struct LoopDictionary;

        impl TagDictionary for LoopDictionary {
            fn lookup(&self, _tag: &[u8]) -> Option<&dyn DecodeRule> {
                Some(&SelfNesting)
            }
        }

        // 1 -> 1 -> 1 -> 1 -> (empty): four levels of nesting.
        let mut value = Bytes::new();
        for _ in 0..4 {
            let mut buf = BytesMut::new();
            buf.extend_from_slice(&[0x01]);
            encode_ber_length(value.len() as u64, &mut buf);
            buf.extend_from_slice(&value);
            value = buf.freeze();
        }

        let config = ParserConfig {
            max_depth: 2,
            ..ParserConfig::default()
        };
        let (items, status) = KlvPacketParser::new(config)
            .parse_value(value, &LoopDictionary)
            .finish();

        assert!(status.is_complete());
        let ItemValue::Decoded {
            value: DecodedValue::Set { items: level1, .. },
            ..
        } = &items[0].value
        else {
            panic!("expected set");
        };
        let ItemValue::Decoded {
            value: DecodedValue::Set { items, status },
            ..
        } = &level1[0].value
        else {
            panic!("expected set");
        };
        assert!(items.is_empty());
        assert_eq!(
            status,
            &ParseStatus::Partial {
                offset: 0,
                reason: MalformedNesting::TooDeep { max_depth: 2 },
            }
        );
    }

    #[test]
    fn empty_value_has_no_items() {
        let (items, status) = KlvPacketParser::default()
            .parse(&packet(Bytes::new()), &EmptyDictionary)
            .finish();
        assert!(items.is_empty());
        assert!(status.is_complete());
    }
}
