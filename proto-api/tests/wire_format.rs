//! The language runtime contract is consumed by existing callers, so field
//! numbers and wire types are pinned here byte for byte.

use std::collections::HashMap;

use prost::Message;
use proto_api::language_pb::{
    GetRequiredPluginsRequest,
    GetRequiredPluginsResponse,
    PluginDependency,
    PluginInfo,
    RunRequest,
    RunResponse,
};

#[test]
fn test_get_required_plugins_request_layout() {
    let req = GetRequiredPluginsRequest {
        project: "proj".to_string(),
        pwd: "/work".to_string(),
        program: "index".to_string(),
    };
    let mut expected = vec![0x0a, 4];
    expected.extend_from_slice(b"proj");
    expected.extend_from_slice(&[0x12, 5]);
    expected.extend_from_slice(b"/work");
    expected.extend_from_slice(&[0x1a, 5]);
    expected.extend_from_slice(b"index");
    assert_eq!(req.encode_to_vec(), expected);

    let decoded = GetRequiredPluginsRequest::decode(expected.as_slice()).unwrap();
    assert_eq!(decoded, req);
}

#[test]
fn test_unset_strings_decode_as_empty() {
    // Only `pwd` is present on the wire.
    let bytes = [0x12, 1, b'/'];
    let decoded = GetRequiredPluginsRequest::decode(&bytes[..]).unwrap();
    assert_eq!(decoded.project, "");
    assert_eq!(decoded.pwd, "/");
    assert_eq!(decoded.program, "");

    assert!(RunResponse::default().encode_to_vec().is_empty());
    assert_eq!(RunResponse::decode(&[][..]).unwrap().error, "");
}

#[test]
fn test_run_request_scalar_fields() {
    let req = RunRequest {
        dry_run: true,
        ..Default::default()
    };
    assert_eq!(req.encode_to_vec(), vec![0x38, 0x01]);

    let req = RunRequest {
        parallel: 4,
        ..Default::default()
    };
    assert_eq!(req.encode_to_vec(), vec![0x40, 0x04]);

    let req = RunRequest {
        stack: "s".to_string(),
        program: "p".to_string(),
        args: vec!["a".to_string(), "b".to_string()],
        monitor_address: "m".to_string(),
        ..Default::default()
    };
    assert_eq!(
        req.encode_to_vec(),
        vec![
            0x12, 1, b's', // stack = 2
            0x22, 1, b'p', // program = 4
            0x2a, 1, b'a', 0x2a, 1, b'b', // args = 5, in order
            0x4a, 1, b'm', // monitor_address = 9
        ]
    );

    // int32 negatives are sign-extended to a ten byte varint.
    let req = RunRequest {
        parallel: -1,
        ..Default::default()
    };
    let bytes = req.encode_to_vec();
    assert_eq!(bytes.len(), 11);
    assert_eq!(RunRequest::decode(bytes.as_slice()).unwrap().parallel, -1);
}

#[test]
fn test_config_map_entries() {
    let req = RunRequest {
        config: HashMap::from([("k".to_string(), "v".to_string())]),
        ..Default::default()
    };
    // map<string, string> is a repeated entry message with key = 1, value = 2.
    assert_eq!(
        req.encode_to_vec(),
        vec![0x32, 6, 0x0a, 1, b'k', 0x12, 1, b'v']
    );

    let config = HashMap::from([
        ("proj:a".to_string(), "same".to_string()),
        ("proj:b".to_string(), "same".to_string()),
        ("proj:empty".to_string(), String::new()),
    ]);
    let req = RunRequest {
        config: config.clone(),
        ..Default::default()
    };
    let decoded = RunRequest::decode(req.encode_to_vec().as_slice()).unwrap();
    assert_eq!(decoded.config, config);

    let decoded = RunRequest::decode(RunRequest::default().encode_to_vec().as_slice()).unwrap();
    assert!(decoded.config.is_empty());
}

#[test]
fn test_plugin_messages() {
    let resp = GetRequiredPluginsResponse {
        plugins: vec![PluginDependency {
            name: "aws".to_string(),
            kind: "resource".to_string(),
            version: "1.0.0".to_string(),
            server: "s".to_string(),
        }],
    };
    let mut inner = vec![0x0a, 3];
    inner.extend_from_slice(b"aws");
    inner.extend_from_slice(&[0x12, 8]);
    inner.extend_from_slice(b"resource");
    inner.extend_from_slice(&[0x1a, 5]);
    inner.extend_from_slice(b"1.0.0");
    inner.extend_from_slice(&[0x22, 1, b's']);
    let mut expected = vec![0x0a, inner.len() as u8];
    expected.extend_from_slice(&inner);
    assert_eq!(resp.encode_to_vec(), expected);

    let info = PluginInfo {
        version: "1.2.3".to_string(),
    };
    let mut expected = vec![0x0a, 5];
    expected.extend_from_slice(b"1.2.3");
    assert_eq!(info.encode_to_vec(), expected);
}

#[test]
fn test_unknown_fields_are_skipped() {
    // error = 1 followed by an unknown varint field 15.
    let bytes = [0x0a, 2, b'o', b'k', 0x78, 0x01];
    let decoded = RunResponse::decode(&bytes[..]).unwrap();
    assert_eq!(decoded.error, "ok");
}
