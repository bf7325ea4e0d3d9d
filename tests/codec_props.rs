//! Property tests for the wire codec: no input may panic the decoder, and
//! request ids survive the round trip through a response frame unchanged.

use camd::api::codec::{decode, RpcResponse};
use camd::api::error::RpcError;
use proptest::prelude::*;
use serde_json::{json, Value};

const MAX: usize = 1024 * 1024;

proptest! {
    #[test]
    fn decode_never_panics_on_arbitrary_input(input in ".{0,2048}") {
        let _ = decode(&input, MAX);
    }

    #[test]
    fn decode_never_panics_on_bracket_soup(input in "[\\[\\]{}\"\\\\a:,0-9 ]{0,512}") {
        let _ = decode(&input, MAX);
    }

    #[test]
    fn integer_ids_round_trip(id in any::<i64>()) {
        let encoded = RpcResponse::result(json!(id), json!("pong")).encode();
        let parsed: Value = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(&parsed["id"], &json!(id));
    }

    #[test]
    fn string_ids_round_trip(id in "[a-zA-Z0-9_-]{0,64}") {
        let encoded = RpcResponse::error(
            json!(id.clone()),
            RpcError::method_not_found("x"),
        )
        .encode();
        let parsed: Value = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(parsed["id"].as_str().unwrap(), id);
    }

    #[test]
    fn valid_requests_always_decode(
        id in any::<u32>(),
        method in "[a-z_]{1,32}",
    ) {
        let frame = json!({
            "jsonrpc": "2.0",
            "method": method.clone(),
            "id": id,
            "params": {},
        })
        .to_string();
        let req = decode(&frame, MAX).unwrap();
        prop_assert_eq!(req.method, method);
        prop_assert_eq!(req.id, Some(json!(id)));
    }
}
