// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::{HashMap, VecDeque};

use rstest::rstest;

use super::super::bolt5x0::Bolt5x0StructTranslator;
use super::deserialize::{IntegerPolicy, PackStreamDeserializer, PackStreamDeserializerImpl};
use super::serialize::{PackStreamSerializer, PackStreamSerializerImpl};
use crate::bolt::BoltStructTranslator;
use crate::value::{BrokenValue, BrokenValueInner, ValueReceive, ValueSend};

fn decode(input: Vec<u8>) -> (ValueReceive, Vec<u8>) {
    decode_with_policy(input, IntegerPolicy::Lossless)
}

fn decode_with_policy(input: Vec<u8>, policy: IntegerPolicy) -> (ValueReceive, Vec<u8>) {
    let translator = Bolt5x0StructTranslator::default();
    let mut reader = input.as_slice();
    let mut deserializer = PackStreamDeserializerImpl::new(&mut reader, policy);
    let result = deserializer.load(&translator).unwrap();
    let rest = reader.to_vec();
    (result, rest)
}

fn encode(value: &ValueSend) -> Vec<u8> {
    let translator = Bolt5x0StructTranslator::default();
    let mut buffer = Vec::new();
    let mut serializer = PackStreamSerializerImpl::new(&mut buffer);
    translator.serialize(&mut serializer, value).unwrap();
    buffer
}

// =============
// Test Decoding
// =============

#[rstest]
#[case(vec![0xC0], ValueReceive::Null)]
#[case(vec![0xC2], ValueReceive::Boolean(false))]
#[case(vec![0xC3], ValueReceive::Boolean(true))]
fn test_decode_primitives(#[case] input: Vec<u8>, #[case] output: ValueReceive) {
    let (result, rest) = decode(input);
    assert_eq!(result, output);
    assert_eq!(rest, Vec::<u8>::new());
}

#[rstest]
#[case(vec![0xF0], -16)]
#[case(vec![0xFF], -1)]
#[case(vec![0x00], 0)]
#[case(vec![0x7F], 127)]
#[case(vec![0xC8, 0x80], -128)]
#[case(vec![0xC8, 0xD6], -42)]
#[case(vec![0xC9, 0x80, 0x00], -32768)]
#[case(vec![0xC9, 0x7F, 0xFF], 32767)]
#[case(vec![0xCA, 0x80, 0x00, 0x00, 0x00], -2147483648)]
#[case(vec![0xCA, 0x7F, 0xFF, 0xFF, 0xFF], 2147483647)]
#[case(vec![0xCB, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], i64::MIN)]
#[case(vec![0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], i64::MAX)]
// any width must be accepted, value preserved
#[case(vec![0xC9, 0x00, 0x2A], 42)]
#[case(vec![0xCA, 0x00, 0x00, 0x00, 0x2A], 42)]
#[case(vec![0xCB, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2A], 42)]
fn test_decode_integer(#[case] input: Vec<u8>, #[case] output: i64) {
    let (result, rest) = decode(input);
    assert_eq!(result, ValueReceive::Integer(output));
    assert_eq!(rest, Vec::<u8>::new());
}

#[rstest]
#[case(vec![0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A], 1.1)]
#[case(vec![0xC1, 0xBF, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A], -1.1)]
#[case(vec![0xC1, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], 0.)]
fn test_decode_float(#[case] input: Vec<u8>, #[case] output: f64) {
    let (result, rest) = decode(input);
    assert_eq!(result, ValueReceive::Float(output));
    assert_eq!(rest, Vec::<u8>::new());
}

#[rstest]
#[case(vec![0x80], "")]
#[case(vec![0x81, 0x41], "A")]
#[case(vec![0x84, 0xF0, 0x9F, 0xA4, 0x98], "🤘")]
#[case(vec![0xD0, 0x1A, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A,
             0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0x73, 0x74, 0x75, 0x76,
             0x77, 0x78, 0x79, 0x7A],
        "abcdefghijklmnopqrstuvwxyz")]
fn test_decode_string(#[case] input: Vec<u8>, #[case] output: &str) {
    let (result, rest) = decode(input);
    assert_eq!(result, ValueReceive::String(String::from(output)));
    assert_eq!(rest, Vec::<u8>::new());
}

#[test]
fn test_decode_bytes() {
    let (result, rest) = decode(vec![0xCC, 0x03, 0x01, 0x02, 0x03]);
    assert_eq!(result, ValueReceive::Bytes(vec![1, 2, 3]));
    assert_eq!(rest, Vec::<u8>::new());
}

#[test]
fn test_decode_list() {
    let (result, rest) = decode(vec![0x93, 0x01, 0xC1, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00,
                                     0x00, 0x00, 0x85, 0x74, 0x68, 0x72, 0x65, 0x65]);
    assert_eq!(
        result,
        ValueReceive::List(vec![
            ValueReceive::Integer(1),
            ValueReceive::Float(2.0),
            ValueReceive::String(String::from("three")),
        ])
    );
    assert_eq!(rest, Vec::<u8>::new());
}

#[test]
fn test_decode_nested_dict() {
    let (result, rest) = decode(vec![
        0xA1, 0x83, 0x6F, 0x6E, 0x65, // {"one":
        0xA1, 0x83, 0x74, 0x77, 0x6F, 0x02, // {"two": 2}}
    ]);
    let ValueReceive::Map(map) = result else {
        panic!("expected map, got {result:?}");
    };
    let inner = map.get("one").and_then(ValueReceive::as_map).unwrap();
    assert_eq!(inner.get("two"), Some(&ValueReceive::Integer(2)));
    assert_eq!(rest, Vec::<u8>::new());
}

#[test]
fn test_decode_unknown_struct_stays_opaque() {
    let (result, rest) = decode(vec![0xB1, 0xEE, 0x01]);
    let ValueReceive::BrokenValue(BrokenValue {
        inner: BrokenValueInner::UnknownStruct { tag, fields },
    }) = result
    else {
        panic!("expected unknown struct, got {result:?}");
    };
    assert_eq!(tag, 0xEE);
    assert_eq!(
        fields,
        VecDeque::from(vec![ValueReceive::Integer(1)])
    );
    assert_eq!(rest, Vec::<u8>::new());
}

#[test]
fn test_decode_struct_8_marker() {
    // 0xDC <size> <tag> <fields...>
    let (result, rest) = decode(vec![0xDC, 0x02, 0xEE, 0x01, 0x02]);
    let ValueReceive::BrokenValue(BrokenValue {
        inner: BrokenValueInner::UnknownStruct { tag, fields },
    }) = result
    else {
        panic!("expected unknown struct, got {result:?}");
    };
    assert_eq!(tag, 0xEE);
    assert_eq!(fields.len(), 2);
    assert_eq!(rest, Vec::<u8>::new());
}

#[test]
fn test_decode_unknown_marker_is_protocol_violation() {
    let translator = Bolt5x0StructTranslator::default();
    let input = [0xDF];
    let mut reader = input.as_slice();
    let mut deserializer = PackStreamDeserializerImpl::new(&mut reader, IntegerPolicy::Lossless);
    let err = deserializer.load(&translator).unwrap_err();
    assert!(format!("{err}").contains("unknown marker"));
}

#[rstest]
#[case(vec![0x2A], 42.)]
#[case(vec![0xCB, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01], 9007199254740993.)]
fn test_lossy_integer_policy_converts_to_float(#[case] input: Vec<u8>, #[case] output: f64) {
    let (result, rest) = decode_with_policy(input, IntegerPolicy::LossyFloat);
    assert_eq!(result, ValueReceive::Float(output));
    assert_eq!(rest, Vec::<u8>::new());
}

// =============
// Test Encoding
// =============

#[rstest]
#[case(ValueSend::Null, vec![0xC0])]
#[case(ValueSend::Boolean(false), vec![0xC2])]
#[case(ValueSend::Boolean(true), vec![0xC3])]
fn test_encode_primitives(#[case] input: ValueSend, #[case] output: Vec<u8>) {
    assert_eq!(encode(&input), output);
}

// the packer picks the smallest width that holds the value
#[rstest]
#[case(0, vec![0x00])]
#[case(-16, vec![0xF0])]
#[case(127, vec![0x7F])]
#[case(-17, vec![0xC8, 0xEF])]
#[case(-128, vec![0xC8, 0x80])]
#[case(128, vec![0xC9, 0x00, 0x80])]
#[case(-129, vec![0xC9, 0xFF, 0x7F])]
#[case(32767, vec![0xC9, 0x7F, 0xFF])]
#[case(-32768, vec![0xC9, 0x80, 0x00])]
#[case(32768, vec![0xCA, 0x00, 0x00, 0x80, 0x00])]
#[case(-32769, vec![0xCA, 0xFF, 0xFF, 0x7F, 0xFF])]
#[case(2147483647, vec![0xCA, 0x7F, 0xFF, 0xFF, 0xFF])]
#[case(-2147483648, vec![0xCA, 0x80, 0x00, 0x00, 0x00])]
#[case(2147483648, vec![0xCB, 0x00, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00])]
#[case(-2147483649, vec![0xCB, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F, 0xFF, 0xFF, 0xFF])]
#[case(i64::MAX, vec![0xCB, 0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF])]
#[case(i64::MIN, vec![0xCB, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])]
fn test_encode_integer_minimal_width(#[case] input: i64, #[case] output: Vec<u8>) {
    assert_eq!(encode(&ValueSend::Integer(input)), output);
}

#[rstest]
#[case("", vec![0x80])]
#[case("A", vec![0x81, 0x41])]
fn test_encode_string(#[case] input: &str, #[case] output: Vec<u8>) {
    assert_eq!(encode(&ValueSend::String(String::from(input))), output);
}

#[test]
fn test_encode_string_byte_equality() {
    let a = encode(&ValueSend::String(String::from("Größenwahn")));
    let b = encode(&ValueSend::String(String::from("Größenwahn")));
    assert_eq!(a, b);
}

#[test]
fn test_encode_long_string_width() {
    let string: String = "x".repeat(256);
    let encoded = encode(&ValueSend::String(string));
    assert_eq!(encoded[0], 0xD1);
    assert_eq!(encoded[1..3], [0x01, 0x00]);
    assert_eq!(encoded.len(), 3 + 256);
}

#[test]
fn test_encode_list_header() {
    let list = ValueSend::List(vec![ValueSend::Integer(1); 16]);
    let encoded = encode(&list);
    assert_eq!(encoded[..2], [0xD4, 0x10]);
}

#[test]
fn test_encode_dict() {
    let mut map = HashMap::new();
    map.insert(String::from("a"), ValueSend::Integer(1));
    let encoded = encode(&ValueSend::Map(map));
    assert_eq!(encoded, vec![0xA1, 0x81, 0x61, 0x01]);
}

// ===============
// Test Round-Trip
// ===============

fn round_trip(value: ValueSend) -> ValueReceive {
    let (result, rest) = decode(encode(&value));
    assert_eq!(rest, Vec::<u8>::new());
    result
}

#[rstest]
#[case(ValueSend::Null, ValueReceive::Null)]
#[case(ValueSend::Boolean(true), ValueReceive::Boolean(true))]
#[case(ValueSend::Integer(i64::MIN), ValueReceive::Integer(i64::MIN))]
#[case(ValueSend::Integer(i64::MAX), ValueReceive::Integer(i64::MAX))]
#[case(ValueSend::Float(1.5), ValueReceive::Float(1.5))]
#[case(ValueSend::String(String::from("hello")),
       ValueReceive::String(String::from("hello")))]
#[case(ValueSend::Bytes(vec![0, 255]), ValueReceive::Bytes(vec![0, 255]))]
fn test_round_trip(#[case] input: ValueSend, #[case] output: ValueReceive) {
    assert_eq!(round_trip(input), output);
}

#[test]
fn test_round_trip_nested_collections() {
    let mut map = HashMap::new();
    map.insert(
        String::from("values"),
        ValueSend::List(vec![
            ValueSend::Integer(1),
            ValueSend::String(String::from("two")),
            ValueSend::Null,
        ]),
    );
    let result = round_trip(ValueSend::Map(map));
    let ValueReceive::Map(map) = result else {
        panic!("expected map");
    };
    assert_eq!(
        map.get("values"),
        Some(&ValueReceive::List(vec![
            ValueReceive::Integer(1),
            ValueReceive::String(String::from("two")),
            ValueReceive::Null,
        ]))
    );
}

#[test]
fn test_round_trip_spatial() {
    use crate::value::spatial::{Cartesian2D, WGS84_3D};

    let result = round_trip(ValueSend::Cartesian2D(Cartesian2D::new(1.0, 2.0)));
    assert_eq!(result, ValueReceive::Cartesian2D(Cartesian2D::new(1.0, 2.0)));

    let result = round_trip(ValueSend::WGS84_3D(WGS84_3D::new(1.0, 2.0, 3.0)));
    assert_eq!(result, ValueReceive::WGS84_3D(WGS84_3D::new(1.0, 2.0, 3.0)));
}

#[test]
fn test_round_trip_temporal() {
    use crate::value::time::{Date, Duration};

    let date = Date::from_ymd_opt(2022, 10, 30).unwrap();
    assert_eq!(round_trip(ValueSend::Date(date)), ValueReceive::Date(date));

    let duration = Duration::new(1, 2, 3, 4).unwrap();
    assert_eq!(
        round_trip(ValueSend::Duration(duration)),
        ValueReceive::Duration(duration)
    );
}
