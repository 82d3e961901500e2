//! 网关端到端测试
//!
//! 通过 `Gateway` 提交 prost 编码的消息，验证路由、改写和拒绝结果。

use bytes::Bytes;
use prost::Message;
use relaypb::prelude::*;

#[derive(Clone, PartialEq, prost::Message)]
struct Header {
    #[prost(string, tag = "1")]
    request_id: String,
    #[prost(string, tag = "2")]
    status: String,
    #[prost(string, tag = "3")]
    target: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Data {
    #[prost(string, repeated, tag = "1")]
    strings: Vec<String>,
    #[prost(uint32, repeated, tag = "2")]
    codes: Vec<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Envelope {
    #[prost(message, optional, tag = "1")]
    header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    data: Option<Data>,
}

const SCHEMA: &str = r#"
[[message]]
name = "Header"

[[message.field]]
tag = 1
name = "request_id"
type = "string"

[[message.field]]
tag = 2
name = "status"
type = "string"

[[message.field]]
tag = 3
name = "target"
type = "string"

[[message]]
name = "Data"

[[message.field]]
tag = 1
name = "strings"
type = "string"
repeated = true

[[message.field]]
tag = 2
name = "codes"
type = "uint32"
repeated = true

[[message]]
name = "Envelope"

[[message.field]]
tag = 1
name = "header"
type = "Header"

[[message.field]]
tag = 2
name = "data"
type = "Data"
"#;

fn table() -> DescriptorTable {
    DescriptorTable::from_toml_str(SCHEMA).unwrap()
}

fn sample(target: &str) -> Envelope {
    Envelope {
        header: Some(Header {
            request_id: "req-42".to_string(),
            status: "pending".to_string(),
            target: target.to_string(),
        }),
        data: Some(Data {
            strings: vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()],
            codes: vec![1, 300, 70000],
        }),
    }
}

fn encode<M: Message>(msg: &M) -> Bytes {
    Bytes::from(msg.encode_to_vec())
}

fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        worker_threads: Some(2),
        channel_size: 16,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_gateway_forwards_identical_bytes() {
    let mut gateway = Gateway::builder()
        .config(gateway_config())
        .schema(table())
        .route("execA", "10.0.0.1:7000")
        .route("execB", "10.0.0.2:7000")
        .start()
        .unwrap();

    let input = encode(&sample("execB"));
    let seq = gateway.submit(input.clone()).await.unwrap();

    match gateway.recv().await.unwrap() {
        Outbound::Routed(msg) => {
            assert_eq!(msg.sequence_id, seq);
            assert_eq!(msg.destination, "10.0.0.2:7000");
            assert_eq!(msg.payload, input);
            assert!(!msg.mutated);
        }
        Outbound::Rejected(msg) => panic!("rejected: {}", msg.error),
    }

    assert!(gateway.shutdown().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_rewrites_status() {
    let mut gateway = Gateway::builder()
        .config(gateway_config())
        .schema(table())
        .route("execA", "10.0.0.1:7000")
        .rewrite("header", Override::string(2, "done"))
        .start()
        .unwrap();

    let msg = sample("execA");
    gateway.submit(encode(&msg)).await.unwrap();

    match gateway.recv().await.unwrap() {
        Outbound::Routed(routed) => {
            assert!(routed.mutated);
            let decoded = Envelope::decode(routed.payload).unwrap();
            let header = decoded.header.unwrap();
            assert_eq!(header.status, "done");
            assert_eq!(header.request_id, "req-42");
            assert_eq!(header.target, "execA");
            assert_eq!(decoded.data, msg.data);
        }
        Outbound::Rejected(rejected) => panic!("rejected: {}", rejected.error),
    }

    assert!(gateway.shutdown().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_rejections() {
    let config = GatewayConfig {
        max_message_size: 64,
        ..gateway_config()
    };
    let mut gateway = Gateway::builder()
        .config(config)
        .schema(table())
        .route("execA", "10.0.0.1:7000")
        .start()
        .unwrap();

    let no_route = gateway.submit(encode(&sample("execZ"))).await.unwrap();
    let oversized = gateway
        .submit(Override::bytes(9, &[0u8; 128]).encoded().clone())
        .await
        .unwrap();
    let truncated = gateway
        .submit(Bytes::from_static(&[0x0a, 0x96]))
        .await
        .unwrap();

    let mut kinds = Vec::new();
    for _ in 0..3 {
        match gateway.recv().await.unwrap() {
            Outbound::Rejected(msg) => {
                if msg.sequence_id == truncated {
                    assert!(matches!(
                        msg.error.find_source::<WireError>(),
                        Some(WireError::TruncatedInput { .. })
                    ));
                }
                kinds.push((msg.sequence_id, msg.error.kind(), msg.error.is_fatal()));
            }
            Outbound::Routed(msg) => panic!("unexpected route to {}", msg.destination),
        }
    }
    kinds.sort_by_key(|(seq, _, _)| *seq);
    assert_eq!(
        kinds,
        vec![
            (no_route, RelayErrorKind::Router, false),
            (oversized, RelayErrorKind::Validation, false),
            (truncated, RelayErrorKind::Wire, true),
        ]
    );

    assert!(gateway.shutdown().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_default_destination() {
    let mut gateway = Gateway::builder()
        .config(gateway_config())
        .schema(table())
        .default_destination("fallback")
        .start()
        .unwrap();

    gateway.submit(encode(&Envelope::default())).await.unwrap();
    match gateway.recv().await.unwrap() {
        Outbound::Routed(msg) => assert_eq!(msg.destination, "fallback"),
        Outbound::Rejected(msg) => panic!("rejected: {}", msg.error),
    }

    assert!(gateway.shutdown().await.unwrap().is_empty());
}
