// Copyright 2026 Adobe. All rights reserved.
// This file is licensed to you under the Apache License,
// Version 2.0 (http://www.apache.org/licenses/LICENSE-2.0)
// or the MIT license (http://opensource.org/licenses/MIT),
// at your option.

// Unless required by applicable law or agreed to in writing,
// this software is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR REPRESENTATIONS OF ANY KIND, either express or
// implied. See the LICENSE-MIT and LICENSE-APACHE files for the
// specific language governing permissions and limitations under
// each license.

// Readers that hand out bytes one at a time, get interrupted by signals, or
// fail outright. Decoding must see exactly the bytes that were written, no
// matter how the reader chops them up.

use std::collections::BTreeMap;
use std::io::{self, Read};

use msgpack_stream::{Decoder, MsgPackError, Value};

/// Returns `Interrupted` before every byte, then delivers a single byte.
struct Trickle<'a> {
    data: &'a [u8],
    interrupt_next: bool,
}

impl<'a> Trickle<'a> {
    fn new(data: &'a [u8]) -> Self {
        Trickle {
            data,
            interrupt_next: true,
        }
    }
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt_next {
            self.interrupt_next = false;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
        }
        self.interrupt_next = true;
        let len = buf.len().min(1);
        (&mut self.data).read(&mut buf[..len])
    }
}

/// Delivers `limit` bytes and then fails with `kind`.
struct Broken<'a> {
    data: &'a [u8],
    limit: usize,
    kind: io::ErrorKind,
}

impl Read for Broken<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.limit == 0 {
            return Err(io::Error::new(self.kind, "connection reset by peer"));
        }
        let len = buf.len().min(self.limit);
        let n = (&mut self.data).read(&mut buf[..len])?;
        self.limit -= n;
        Ok(n)
    }
}

#[test]
fn test_trickled_map16_decodes_exactly() {
    // map16 with {"alpha": uint32 70000, "beta": [-1, 1.5f64]}
    let mut bytes = vec![0xde, 0x00, 0x02];
    bytes.extend_from_slice(&[0xa5, b'a', b'l', b'p', b'h', b'a', 0xce]);
    bytes.extend_from_slice(&70_000u32.to_be_bytes());
    bytes.extend_from_slice(&[0xa4, b'b', b'e', b't', b'a', 0x92, 0xff, 0xcb]);
    bytes.extend_from_slice(&1.5f64.to_be_bytes());

    let mut decoder = Decoder::new(Trickle::new(&bytes));
    let value: Value = decoder.decode().unwrap();

    assert_eq!(value.get("alpha"), Some(&Value::UInt(70_000)));
    assert_eq!(
        value.get("beta"),
        Some(&Value::Array(vec![Value::Int(-1), Value::Float64(1.5)]))
    );
    assert!(decoder.get_ref().data.is_empty());
}

#[test]
fn test_trickled_raw16_payload() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let mut bytes = vec![0xda];
    bytes.extend_from_slice(&1000u16.to_be_bytes());
    bytes.extend_from_slice(&payload);

    let mut decoder = Decoder::new(Trickle::new(&bytes));
    let decoded: serde_bytes::ByteBuf = decoder.decode().unwrap();
    assert_eq!(decoded.into_vec(), payload);
}

#[test]
fn test_trickled_lookahead_then_value() {
    // nil, then {"n": 3}
    let bytes = [0xc0, 0x81, 0xa1, b'n', 0x03];
    let mut decoder = Decoder::new(Trickle::new(&bytes));

    assert!(decoder.is_nil().unwrap());
    decoder.consume_nil().unwrap();
    assert!(!decoder.is_nil().unwrap());

    let map: BTreeMap<String, u8> = decoder.decode().unwrap();
    assert_eq!(map["n"], 3);
}

#[test]
fn test_reader_error_is_stream_failure() {
    // uint32 tag followed by only two of its four payload bytes
    let bytes = [0xce, 0x00, 0x01, 0x00, 0x00];
    let mut decoder = Decoder::new(Broken {
        data: &bytes,
        limit: 3,
        kind: io::ErrorKind::ConnectionReset,
    });

    let err = decoder.decode::<u32>().unwrap_err();
    assert!(err.is_stream_failure());
    assert!(
        err.to_string().starts_with("read from stream failed"),
        "got: {err}"
    );
    match err {
        MsgPackError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(matches!(decoder.decode::<u32>(), Err(MsgPackError::Poisoned)));
}

#[test]
fn test_truncated_stream_is_stream_failure() {
    // fixraw of length 5 with only three bytes behind it
    let bytes = [0xa5, b'a', b'b', b'c'];
    let mut decoder = Decoder::new(&bytes[..]);
    let err = decoder.decode::<String>().unwrap_err();
    assert!(err.is_stream_failure());

    // an empty stream fails on the tag itself
    let mut decoder = Decoder::new(io::empty());
    assert!(decoder.is_nil().unwrap_err().is_stream_failure());
}

#[test]
fn test_data_errors_are_not_stream_failures() {
    let mut decoder = Decoder::new(Trickle::new(&[0xc1]));
    let err = decoder.decode::<i64>().unwrap_err();
    assert!(!err.is_stream_failure());
    assert!(matches!(err, MsgPackError::UnexpectedTag { tag: 0xc1, .. }));
}
