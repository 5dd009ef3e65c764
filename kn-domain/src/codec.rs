//! Deterministic, bit-exact encoding for the three attribute blobs
//! (`UserAttributes`, `NoteAttributes`, `ResourceAttributes`) that are
//! persisted as opaque binary columns (§4.8).
//!
//! Layout: a little-endian bitmask (one bit per optional field, in
//! declaration order) followed by the fixed-width or length-prefixed
//! encoding of every field whose bit is set. Unset fields contribute no
//! bytes at all, so two blobs with the same field values always encode to
//! the same bytes regardless of how they were constructed.

use thiserror::Error;

use crate::entities::{ApplicationData, NoteAttributes, ResourceAttributes, UserAttributes};

pub const USER_ATTRIBUTES_FIELD_COUNT: u32 = 21;
pub const NOTE_ATTRIBUTES_FIELD_COUNT: u32 = 19;
pub const RESOURCE_ATTRIBUTES_FIELD_COUNT: u32 = 12;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of buffer while decoding")]
    UnexpectedEof,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("{0} trailing byte(s) after decoding")]
    TrailingBytes(usize),
}

struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn write_application_data(&mut self, data: &ApplicationData) {
        self.write_u32(data.keys_only.len() as u32);
        for key in &data.keys_only {
            self.write_string(key);
        }
        self.write_u32(data.full_map.len() as u32);
        for (key, value) in &data.full_map {
            self.write_string(key);
            self.write_string(value);
        }
    }

    fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_be_bytes(bytes))
    }

    fn read_i16(&mut self) -> Result<i16, CodecError> {
        let bytes: [u8; 2] = self.take(2)?.try_into().unwrap();
        Ok(i16::from_be_bytes(bytes))
    }

    fn read_i32(&mut self) -> Result<i32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(i32::from_be_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(i64::from_be_bytes(bytes))
    }

    fn read_f64(&mut self) -> Result<f64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(f64::from_be_bytes(bytes))
    }

    fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    fn read_application_data(&mut self) -> Result<ApplicationData, CodecError> {
        let keys_count = self.read_u32()?;
        let mut keys_only = Vec::with_capacity(keys_count as usize);
        for _ in 0..keys_count {
            keys_only.push(self.read_string()?);
        }
        let map_count = self.read_u32()?;
        let mut full_map = std::collections::BTreeMap::new();
        for _ in 0..map_count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            full_map.insert(key, value);
        }
        Ok(ApplicationData { keys_only, full_map })
    }

    fn finish(self) -> Result<(), CodecError> {
        let remaining = self.buf.len() - self.pos;
        if remaining != 0 {
            return Err(CodecError::TrailingBytes(remaining));
        }
        Ok(())
    }
}

macro_rules! bit {
    ($mask:expr, $idx:expr) => {
        ($mask & (1 << $idx)) != 0
    };
}

pub fn encode_user_attributes(attrs: &UserAttributes) -> Vec<u8> {
    let mut mask: u32 = 0;
    let fields: [bool; USER_ATTRIBUTES_FIELD_COUNT as usize] = [
        attrs.default_location_name.is_some(),
        attrs.default_latitude.is_some(),
        attrs.default_longitude.is_some(),
        attrs.preactivation.is_some(),
        attrs.incoming_email_address.is_some(),
        attrs.comments.is_some(),
        attrs.date_agreed_to_terms_of_service.is_some(),
        attrs.max_referrals.is_some(),
        attrs.referral_count.is_some(),
        attrs.referrer_code.is_some(),
        attrs.sent_email_date.is_some(),
        attrs.daily_email_limit.is_some(),
        attrs.email_opt_out_date.is_some(),
        attrs.partner_email_opt_in_date.is_some(),
        attrs.preferred_country.is_some(),
        attrs.preferred_language.is_some(),
        attrs.clip_full_page.is_some(),
        attrs.twitter_user_name.is_some(),
        attrs.group_name.is_some(),
        attrs.recognition_language.is_some(),
        attrs.application_data.is_some(),
    ];
    for (idx, present) in fields.iter().enumerate() {
        if *present {
            mask |= 1 << idx;
        }
    }

    let mut w = ByteWriter::new();
    w.write_u32(mask);
    if let Some(v) = &attrs.default_location_name {
        w.write_string(v);
    }
    if let Some(v) = attrs.default_latitude {
        w.write_f64(v);
    }
    if let Some(v) = attrs.default_longitude {
        w.write_f64(v);
    }
    if let Some(v) = attrs.preactivation {
        w.write_bool(v);
    }
    if let Some(v) = &attrs.incoming_email_address {
        w.write_string(v);
    }
    if let Some(v) = &attrs.comments {
        w.write_string(v);
    }
    if let Some(v) = attrs.date_agreed_to_terms_of_service {
        w.write_i64(v);
    }
    if let Some(v) = attrs.max_referrals {
        w.write_i32(v);
    }
    if let Some(v) = attrs.referral_count {
        w.write_i32(v);
    }
    if let Some(v) = &attrs.referrer_code {
        w.write_string(v);
    }
    if let Some(v) = attrs.sent_email_date {
        w.write_i64(v);
    }
    if let Some(v) = attrs.daily_email_limit {
        w.write_i32(v);
    }
    if let Some(v) = attrs.email_opt_out_date {
        w.write_i64(v);
    }
    if let Some(v) = attrs.partner_email_opt_in_date {
        w.write_i64(v);
    }
    if let Some(v) = &attrs.preferred_country {
        w.write_string(v);
    }
    if let Some(v) = &attrs.preferred_language {
        w.write_string(v);
    }
    if let Some(v) = attrs.clip_full_page {
        w.write_bool(v);
    }
    if let Some(v) = &attrs.twitter_user_name {
        w.write_string(v);
    }
    if let Some(v) = &attrs.group_name {
        w.write_string(v);
    }
    if let Some(v) = &attrs.recognition_language {
        w.write_string(v);
    }
    if let Some(v) = &attrs.application_data {
        w.write_application_data(v);
    }
    w.into_vec()
}

pub fn decode_user_attributes(buf: &[u8]) -> Result<UserAttributes, CodecError> {
    let mut r = ByteReader::new(buf);
    let mask = r.read_u32()?;
    let mut attrs = UserAttributes::default();
    if bit!(mask, 0) {
        attrs.default_location_name = Some(r.read_string()?);
    }
    if bit!(mask, 1) {
        attrs.default_latitude = Some(r.read_f64()?);
    }
    if bit!(mask, 2) {
        attrs.default_longitude = Some(r.read_f64()?);
    }
    if bit!(mask, 3) {
        attrs.preactivation = Some(r.read_bool()?);
    }
    if bit!(mask, 4) {
        attrs.incoming_email_address = Some(r.read_string()?);
    }
    if bit!(mask, 5) {
        attrs.comments = Some(r.read_string()?);
    }
    if bit!(mask, 6) {
        attrs.date_agreed_to_terms_of_service = Some(r.read_i64()?);
    }
    if bit!(mask, 7) {
        attrs.max_referrals = Some(r.read_i32()?);
    }
    if bit!(mask, 8) {
        attrs.referral_count = Some(r.read_i32()?);
    }
    if bit!(mask, 9) {
        attrs.referrer_code = Some(r.read_string()?);
    }
    if bit!(mask, 10) {
        attrs.sent_email_date = Some(r.read_i64()?);
    }
    if bit!(mask, 11) {
        attrs.daily_email_limit = Some(r.read_i32()?);
    }
    if bit!(mask, 12) {
        attrs.email_opt_out_date = Some(r.read_i64()?);
    }
    if bit!(mask, 13) {
        attrs.partner_email_opt_in_date = Some(r.read_i64()?);
    }
    if bit!(mask, 14) {
        attrs.preferred_country = Some(r.read_string()?);
    }
    if bit!(mask, 15) {
        attrs.preferred_language = Some(r.read_string()?);
    }
    if bit!(mask, 16) {
        attrs.clip_full_page = Some(r.read_bool()?);
    }
    if bit!(mask, 17) {
        attrs.twitter_user_name = Some(r.read_string()?);
    }
    if bit!(mask, 18) {
        attrs.group_name = Some(r.read_string()?);
    }
    if bit!(mask, 19) {
        attrs.recognition_language = Some(r.read_string()?);
    }
    if bit!(mask, 20) {
        attrs.application_data = Some(r.read_application_data()?);
    }
    r.finish()?;
    Ok(attrs)
}

pub fn encode_note_attributes(attrs: &NoteAttributes) -> Vec<u8> {
    let fields: [bool; NOTE_ATTRIBUTES_FIELD_COUNT as usize] = [
        attrs.subject_date.is_some(),
        attrs.latitude.is_some(),
        attrs.longitude.is_some(),
        attrs.altitude.is_some(),
        attrs.author.is_some(),
        attrs.source.is_some(),
        attrs.source_url.is_some(),
        attrs.source_application.is_some(),
        attrs.share_date.is_some(),
        attrs.reminder_order.is_some(),
        attrs.reminder_done_time.is_some(),
        attrs.reminder_time.is_some(),
        attrs.place_name.is_some(),
        attrs.content_class.is_some(),
        attrs.application_data.is_some(),
        attrs.last_edited_by.is_some(),
        attrs.classifications.is_some(),
        attrs.creator_id.is_some(),
        attrs.last_editor_id.is_some(),
    ];
    let mut mask: u32 = 0;
    for (idx, present) in fields.iter().enumerate() {
        if *present {
            mask |= 1 << idx;
        }
    }

    let mut w = ByteWriter::new();
    w.write_u32(mask);
    if let Some(v) = attrs.subject_date {
        w.write_i64(v);
    }
    if let Some(v) = attrs.latitude {
        w.write_f64(v);
    }
    if let Some(v) = attrs.longitude {
        w.write_f64(v);
    }
    if let Some(v) = attrs.altitude {
        w.write_f64(v);
    }
    if let Some(v) = &attrs.author {
        w.write_string(v);
    }
    if let Some(v) = &attrs.source {
        w.write_string(v);
    }
    if let Some(v) = &attrs.source_url {
        w.write_string(v);
    }
    if let Some(v) = &attrs.source_application {
        w.write_string(v);
    }
    if let Some(v) = attrs.share_date {
        w.write_i64(v);
    }
    if let Some(v) = attrs.reminder_order {
        w.write_i64(v);
    }
    if let Some(v) = attrs.reminder_done_time {
        w.write_i64(v);
    }
    if let Some(v) = attrs.reminder_time {
        w.write_i64(v);
    }
    if let Some(v) = &attrs.place_name {
        w.write_string(v);
    }
    if let Some(v) = &attrs.content_class {
        w.write_string(v);
    }
    if let Some(v) = &attrs.application_data {
        w.write_application_data(v);
    }
    if let Some(v) = &attrs.last_edited_by {
        w.write_string(v);
    }
    if let Some(v) = &attrs.classifications {
        w.write_u32(v.len() as u32);
        for (key, value) in v {
            w.write_string(key);
            w.write_string(value);
        }
    }
    if let Some(v) = attrs.creator_id {
        w.write_i64(v);
    }
    if let Some(v) = attrs.last_editor_id {
        w.write_i64(v);
    }
    w.into_vec()
}

pub fn decode_note_attributes(buf: &[u8]) -> Result<NoteAttributes, CodecError> {
    let mut r = ByteReader::new(buf);
    let mask = r.read_u32()?;
    let mut attrs = NoteAttributes::default();
    if bit!(mask, 0) {
        attrs.subject_date = Some(r.read_i64()?);
    }
    if bit!(mask, 1) {
        attrs.latitude = Some(r.read_f64()?);
    }
    if bit!(mask, 2) {
        attrs.longitude = Some(r.read_f64()?);
    }
    if bit!(mask, 3) {
        attrs.altitude = Some(r.read_f64()?);
    }
    if bit!(mask, 4) {
        attrs.author = Some(r.read_string()?);
    }
    if bit!(mask, 5) {
        attrs.source = Some(r.read_string()?);
    }
    if bit!(mask, 6) {
        attrs.source_url = Some(r.read_string()?);
    }
    if bit!(mask, 7) {
        attrs.source_application = Some(r.read_string()?);
    }
    if bit!(mask, 8) {
        attrs.share_date = Some(r.read_i64()?);
    }
    if bit!(mask, 9) {
        attrs.reminder_order = Some(r.read_i64()?);
    }
    if bit!(mask, 10) {
        attrs.reminder_done_time = Some(r.read_i64()?);
    }
    if bit!(mask, 11) {
        attrs.reminder_time = Some(r.read_i64()?);
    }
    if bit!(mask, 12) {
        attrs.place_name = Some(r.read_string()?);
    }
    if bit!(mask, 13) {
        attrs.content_class = Some(r.read_string()?);
    }
    if bit!(mask, 14) {
        attrs.application_data = Some(r.read_application_data()?);
    }
    if bit!(mask, 15) {
        attrs.last_edited_by = Some(r.read_string()?);
    }
    if bit!(mask, 16) {
        let count = r.read_u32()?;
        let mut map = std::collections::BTreeMap::new();
        for _ in 0..count {
            let key = r.read_string()?;
            let value = r.read_string()?;
            map.insert(key, value);
        }
        attrs.classifications = Some(map);
    }
    if bit!(mask, 17) {
        attrs.creator_id = Some(r.read_i64()?);
    }
    if bit!(mask, 18) {
        attrs.last_editor_id = Some(r.read_i64()?);
    }
    r.finish()?;
    Ok(attrs)
}

pub fn encode_resource_attributes(attrs: &ResourceAttributes) -> Vec<u8> {
    let fields: [bool; RESOURCE_ATTRIBUTES_FIELD_COUNT as usize] = [
        attrs.source_url.is_some(),
        attrs.timestamp.is_some(),
        attrs.latitude.is_some(),
        attrs.longitude.is_some(),
        attrs.altitude.is_some(),
        attrs.camera_make.is_some(),
        attrs.camera_model.is_some(),
        attrs.client_will_index.is_some(),
        attrs.recognition_type.is_some(),
        attrs.file_name.is_some(),
        attrs.attachment.is_some(),
        attrs.application_data.is_some(),
    ];
    let mut mask: u32 = 0;
    for (idx, present) in fields.iter().enumerate() {
        if *present {
            mask |= 1 << idx;
        }
    }

    let mut w = ByteWriter::new();
    w.write_u32(mask);
    if let Some(v) = &attrs.source_url {
        w.write_string(v);
    }
    if let Some(v) = attrs.timestamp {
        w.write_i64(v);
    }
    if let Some(v) = attrs.latitude {
        w.write_f64(v);
    }
    if let Some(v) = attrs.longitude {
        w.write_f64(v);
    }
    if let Some(v) = attrs.altitude {
        w.write_f64(v);
    }
    if let Some(v) = &attrs.camera_make {
        w.write_string(v);
    }
    if let Some(v) = &attrs.camera_model {
        w.write_string(v);
    }
    if let Some(v) = attrs.client_will_index {
        w.write_bool(v);
    }
    if let Some(v) = &attrs.recognition_type {
        w.write_string(v);
    }
    if let Some(v) = &attrs.file_name {
        w.write_string(v);
    }
    if let Some(v) = attrs.attachment {
        w.write_bool(v);
    }
    if let Some(v) = &attrs.application_data {
        w.write_application_data(v);
    }
    w.into_vec()
}

pub fn decode_resource_attributes(buf: &[u8]) -> Result<ResourceAttributes, CodecError> {
    let mut r = ByteReader::new(buf);
    let mask = r.read_u32()?;
    let mut attrs = ResourceAttributes::default();
    if bit!(mask, 0) {
        attrs.source_url = Some(r.read_string()?);
    }
    if bit!(mask, 1) {
        attrs.timestamp = Some(r.read_i64()?);
    }
    if bit!(mask, 2) {
        attrs.latitude = Some(r.read_f64()?);
    }
    if bit!(mask, 3) {
        attrs.longitude = Some(r.read_f64()?);
    }
    if bit!(mask, 4) {
        attrs.altitude = Some(r.read_f64()?);
    }
    if bit!(mask, 5) {
        attrs.camera_make = Some(r.read_string()?);
    }
    if bit!(mask, 6) {
        attrs.camera_model = Some(r.read_string()?);
    }
    if bit!(mask, 7) {
        attrs.client_will_index = Some(r.read_bool()?);
    }
    if bit!(mask, 8) {
        attrs.recognition_type = Some(r.read_string()?);
    }
    if bit!(mask, 9) {
        attrs.file_name = Some(r.read_string()?);
    }
    if bit!(mask, 10) {
        attrs.attachment = Some(r.read_bool()?);
    }
    if bit!(mask, 11) {
        attrs.application_data = Some(r.read_application_data()?);
    }
    r.finish()?;
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn user_attributes_all_none_round_trips_to_four_byte_mask() {
        let attrs = UserAttributes::default();
        let bytes = encode_user_attributes(&attrs);
        assert_eq!(bytes.len(), 4);
        assert_eq!(decode_user_attributes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn user_attributes_all_some_round_trips() {
        let attrs = UserAttributes {
            default_location_name: Some("Warsaw".into()),
            default_latitude: Some(52.23),
            default_longitude: Some(21.01),
            preactivation: Some(true),
            incoming_email_address: Some("a@b.com".into()),
            comments: Some("hi".into()),
            date_agreed_to_terms_of_service: Some(1000),
            max_referrals: Some(5),
            referral_count: Some(2),
            referrer_code: Some("CODE".into()),
            sent_email_date: Some(2000),
            daily_email_limit: Some(10),
            email_opt_out_date: Some(3000),
            partner_email_opt_in_date: Some(4000),
            preferred_country: Some("PL".into()),
            preferred_language: Some("pl".into()),
            clip_full_page: Some(false),
            twitter_user_name: Some("handle".into()),
            group_name: Some("group".into()),
            recognition_language: Some("en".into()),
            application_data: Some(ApplicationData {
                keys_only: vec!["k1".into()],
                full_map: BTreeMap::from([("k2".to_string(), "v2".to_string())]),
            }),
        };
        let bytes = encode_user_attributes(&attrs);
        assert_eq!(decode_user_attributes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn user_attributes_single_field_each_bit_round_trips() {
        for idx in 0..USER_ATTRIBUTES_FIELD_COUNT {
            let mut attrs = UserAttributes::default();
            match idx {
                0 => attrs.default_location_name = Some("x".into()),
                1 => attrs.default_latitude = Some(1.0),
                2 => attrs.default_longitude = Some(1.0),
                3 => attrs.preactivation = Some(true),
                4 => attrs.incoming_email_address = Some("x".into()),
                5 => attrs.comments = Some("x".into()),
                6 => attrs.date_agreed_to_terms_of_service = Some(1),
                7 => attrs.max_referrals = Some(1),
                8 => attrs.referral_count = Some(1),
                9 => attrs.referrer_code = Some("x".into()),
                10 => attrs.sent_email_date = Some(1),
                11 => attrs.daily_email_limit = Some(1),
                12 => attrs.email_opt_out_date = Some(1),
                13 => attrs.partner_email_opt_in_date = Some(1),
                14 => attrs.preferred_country = Some("x".into()),
                15 => attrs.preferred_language = Some("x".into()),
                16 => attrs.clip_full_page = Some(true),
                17 => attrs.twitter_user_name = Some("x".into()),
                18 => attrs.group_name = Some("x".into()),
                19 => attrs.recognition_language = Some("x".into()),
                20 => {
                    attrs.application_data = Some(ApplicationData::default());
                }
                _ => unreachable!(),
            }
            let bytes = encode_user_attributes(&attrs);
            assert_eq!(decode_user_attributes(&bytes).unwrap(), attrs, "bit {idx} mismatch");
        }
    }

    #[test]
    fn note_attributes_all_some_round_trips() {
        let attrs = NoteAttributes {
            subject_date: Some(1),
            latitude: Some(1.0),
            longitude: Some(1.0),
            altitude: Some(1.0),
            author: Some("a".into()),
            source: Some("s".into()),
            source_url: Some("u".into()),
            source_application: Some("app".into()),
            share_date: Some(2),
            reminder_order: Some(3),
            reminder_done_time: Some(4),
            reminder_time: Some(5),
            place_name: Some("p".into()),
            content_class: Some("c".into()),
            application_data: Some(ApplicationData::default()),
            last_edited_by: Some("e".into()),
            classifications: Some(BTreeMap::from([("a".to_string(), "b".to_string())])),
            creator_id: Some(6),
            last_editor_id: Some(7),
        };
        let bytes = encode_note_attributes(&attrs);
        assert_eq!(decode_note_attributes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn note_attributes_all_none_round_trips() {
        let attrs = NoteAttributes::default();
        assert_eq!(
            decode_note_attributes(&encode_note_attributes(&attrs)).unwrap(),
            attrs
        );
    }

    #[test]
    fn resource_attributes_all_some_round_trips() {
        let attrs = ResourceAttributes {
            source_url: Some("u".into()),
            timestamp: Some(1),
            latitude: Some(1.0),
            longitude: Some(1.0),
            altitude: Some(1.0),
            camera_make: Some("make".into()),
            camera_model: Some("model".into()),
            client_will_index: Some(true),
            recognition_type: Some("t".into()),
            file_name: Some("f".into()),
            attachment: Some(false),
            application_data: Some(ApplicationData::default()),
        };
        let bytes = encode_resource_attributes(&attrs);
        assert_eq!(decode_resource_attributes(&bytes).unwrap(), attrs);
    }

    #[test]
    fn resource_attributes_all_none_round_trips() {
        let attrs = ResourceAttributes::default();
        assert_eq!(
            decode_resource_attributes(&encode_resource_attributes(&attrs)).unwrap(),
            attrs
        );
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let attrs = UserAttributes {
            comments: Some("hello".into()),
            ..Default::default()
        };
        let mut bytes = encode_user_attributes(&attrs);
        bytes.truncate(bytes.len() - 1);
        assert_eq!(decode_user_attributes(&bytes), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let attrs = UserAttributes::default();
        let mut bytes = encode_user_attributes(&attrs);
        bytes.push(0xFF);
        assert_eq!(decode_user_attributes(&bytes), Err(CodecError::TrailingBytes(1)));
    }
}
