use crate::adapter::Adapter;
use crate::dispatcher::CommandError;
use crate::init::InitState;
use crate::stack::{Protocol, SocketAction};
use crate::tests::mock::{FakeTimer, MockHooks, MockTransport, Results};
use crate::wifi::{ApInfo, ClientInfo, Encryption, Error, IpInfo, JoinState, OpMode, ServerAction};
use embedded_nal::Ipv4Addr;
use fugit::ExtU32;
use mockall::predicate::eq;

type AdapterType = Adapter<MockTransport, FakeTimer, 1_000, 64, 16>;

/// Returns an initialized adapter reporting the given operating mode
fn ready_adapter(mode: u8) -> AdapterType {
    let mut transport = MockTransport::new();
    transport.add_init_replies(mode);

    let mut adapter = Adapter::new(transport, FakeTimer::default());
    adapter.init(64, |state| assert_eq!(InitState::Ready, state)).unwrap();
    adapter.pump(100.millis());

    assert_eq!(InitState::Ready, adapter.init_state());
    adapter.transport.clear_written();
    adapter
}

/// Returns an initialized adapter with the given link connected
fn connected_adapter(link_id: usize) -> AdapterType {
    let mut adapter = ready_adapter(1);
    adapter
        .transport
        .add_reply(format!("{},CONNECT\r\n\r\nOK\r\n", link_id).as_bytes());

    adapter.connect(link_id, Protocol::Tcp, "10.0.0.5", 80, |_| {}).unwrap();
    adapter.pump(100.millis());

    assert!(adapter.is_connected(link_id));
    adapter.transport.clear_written();
    adapter
}

#[test]
fn test_join() {
    let mut adapter = ready_adapter(1);
    adapter
        .transport
        .add_reply(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_client_state_changed()
        .withf(|message: &str| message == "WIFI CONNECTED")
        .times(1)
        .return_const(());
    hooks
        .expect_client_state_changed()
        .withf(|message: &str| message == "WIFI GOT IP")
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter.join("test_wifi", "secret", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(())], results.values());
    assert_eq!(
        JoinState {
            connected: true,
            ip_assigned: true
        },
        adapter.join_status()
    );
    assert_eq!(vec!["AT+CWJAP=\"test_wifi\",\"secret\"\r\n"], adapter.transport.written());
}

#[test]
fn test_join_failed() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"WIFI DISCONNECT\r\n+CWJAP:1\r\n\r\nFAIL\r\n");

    let results = Results::new();
    adapter.join("test_wifi", "wrong", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::Fail)], results.values());
    assert_eq!(JoinState::default(), adapter.join_status());
}

#[test]
fn test_join_invalid_credentials() {
    let mut adapter = ready_adapter(1);

    assert_eq!(Err(Error::InvalidSsidLength), adapter.join("", "secret", |_| {}));
    assert_eq!(
        Err(Error::InvalidSsidLength),
        adapter.join("012345678901234567890123", "secret", |_| {})
    );
    assert_eq!(
        Err(Error::InvalidPasswordLength),
        adapter.join("test_wifi", "012345678901234567890123", |_| {})
    );

    adapter.pump(100.millis());
    assert!(adapter.transport.written().is_empty());
}

#[test]
fn test_join_mode_mismatch() {
    let mut adapter = ready_adapter(2);

    assert_eq!(Err(Error::ModeMismatch), adapter.join("test_wifi", "secret", |_| {}));
    assert_eq!(Err(Error::ModeMismatch), adapter.get_client_ap(|_| {}));
    assert!(adapter.get_ap_info(|_| {}).is_ok());
}

#[test]
fn test_wifi_state_urc() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_response(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n");
    adapter.pump(100.millis());
    assert!(adapter.join_status().ip_assigned);

    let mut hooks = MockHooks::new();
    hooks
        .expect_client_state_changed()
        .withf(|message: &str| message == "WIFI DISCONNECT")
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    adapter.transport.add_response(b"WIFI DISCONNECT\r\n");
    adapter.pump(100.millis());

    assert_eq!(JoinState::default(), adapter.join_status());
}

#[test]
fn test_get_client_ap() {
    let mut adapter = ready_adapter(1);
    adapter
        .transport
        .add_reply(b"+CWJAP:\"test_wifi\",\"10:fe:ed:05:ba:50\",6,-52\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.get_client_ap(results.callback()).unwrap();
    adapter.pump(100.millis());

    let info = results.values().remove(0).unwrap();
    assert!(info.has_ap);
    assert_eq!("test_wifi", info.ssid.as_str());
    assert_eq!(Some(&info), adapter.client_info());
    assert_eq!(vec!["AT+CWJAP?\r\n"], adapter.transport.written());
}

#[test]
fn test_get_client_ap_not_joined() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"No AP\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.get_client_ap(results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(ClientInfo::default())], results.values());
}

#[test]
fn test_get_client_ap_line_dropped() {
    let mut transport = MockTransport::new();
    transport.add_init_replies(1);
    transport.add_reply(b"+CWJAP:\"MyNetwork\",\"aa:bb:cc:dd:ee:ff\",6,-60\r\n\r\nOK\r\n");
    transport.add_reply(b"+CIFSR:STAIP,\"10.0.0.181\",\"aa:bb:cc:dd:ee:ff\"\r\n\r\nOK\r\n");

    let mut adapter: AdapterType = Adapter::new(transport, FakeTimer::default());
    adapter.init(32, |state| assert_eq!(InitState::Ready, state)).unwrap();
    adapter.pump(100.millis());

    let client_results = Results::new();
    adapter.get_client_ap(client_results.callback()).unwrap();
    adapter.pump(100.millis());

    let ip_results = Results::new();
    adapter.get_ip_info(ip_results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::InvalidResponse)], client_results.values());
    assert_eq!(vec![Err(CommandError::InvalidResponse)], ip_results.values());
    assert_eq!(None, adapter.client_info());
    assert_eq!(None, adapter.ip_info());
    assert_eq!(2, adapter.parse_errors());
}

#[test]
fn test_get_ip_info() {
    let mut adapter = ready_adapter(3);
    adapter.transport.add_reply(
        b"+CIFSR:APIP,\"192.168.4.1\"\r\n+CIFSR:APMAC,\"1a:fe:34:a1:b2:c3\"\r\n+CIFSR:STAIP,\"10.0.0.181\"\r\n\r\nOK\r\n",
    );

    let results = Results::new();
    adapter.get_ip_info(results.callback()).unwrap();
    adapter.pump(100.millis());

    let expected = IpInfo {
        client: Some(Ipv4Addr::new(10, 0, 0, 181)),
        ap: Some(Ipv4Addr::new(192, 168, 4, 1)),
    };
    assert_eq!(vec![Ok(expected)], results.values());
    assert_eq!(Some(expected), adapter.ip_info());
    assert_eq!(vec!["AT+CIFSR\r\n"], adapter.transport.written());
}

#[test]
fn test_get_ap_info() {
    let mut adapter = ready_adapter(2);
    adapter
        .transport
        .add_reply(b"+CWSAP:\"esp_ap\",\"secret123\",5,3,4,0\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.get_ap_info(results.callback()).unwrap();
    adapter.pump(100.millis());

    let expected = ApInfo::new("esp_ap", "secret123", 5, Encryption::Wpa2Psk).unwrap();
    assert_eq!(vec![Ok(expected.clone())], results.values());
    assert_eq!(Some(&expected), adapter.ap_info());
}

#[test]
fn test_get_ap_info_invalid_response() {
    let mut adapter = ready_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n");

    let results = Results::new();
    adapter.get_ap_info(results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::InvalidResponse)], results.values());
    assert_eq!(None, adapter.ap_info());
}

#[test]
fn test_get_ap_info_mode_mismatch() {
    let mut adapter = ready_adapter(1);
    assert_eq!(Err(Error::ModeMismatch), adapter.get_ap_info(|_| {}));
}

#[test]
fn test_get_op_mode() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"+CWMODE:3\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.get_op_mode(results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(OpMode::Both)], results.values());
    assert_eq!(OpMode::Both, adapter.op_mode());
}

#[test]
fn test_set_op_mode() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"\r\nOK\r\n");

    let results = Results::new();
    adapter.set_op_mode(OpMode::Ap, results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(())], results.values());
    assert_eq!(OpMode::Ap, adapter.op_mode());
    assert_eq!(vec!["AT+CWMODE=2\r\n"], adapter.transport.written());
}

#[test]
fn test_set_op_mode_error() {
    let mut adapter = ready_adapter(1);
    for _ in 0..3 {
        adapter.transport.add_reply(b"\r\nERROR\r\n");
    }

    let results = Results::new();
    adapter.set_op_mode(OpMode::Ap, results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::Error)], results.values());
    assert_eq!(OpMode::Client, adapter.op_mode());
}

#[test]
fn test_set_op_mode_unknown() {
    let mut adapter = ready_adapter(1);
    assert_eq!(Err(Error::InvalidMode), adapter.set_op_mode(OpMode::Unknown, |_| {}));
}

#[test]
fn test_set_ap_info() {
    let mut adapter = ready_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n");

    let info = ApInfo::new("esp_ap", "secret123", 5, Encryption::Wpa2Psk).unwrap();
    let results = Results::new();
    adapter.set_ap_info(info.clone(), results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(())], results.values());
    assert_eq!(Some(&info), adapter.ap_info());
    assert_eq!(
        vec!["AT+CWSAP=\"esp_ap\",\"secret123\",5,3\r\n"],
        adapter.transport.written()
    );
}

#[test]
fn test_set_ap_info_validated() {
    let mut adapter = ready_adapter(3);

    let mut info = ApInfo::new("esp_ap", "secret123", 5, Encryption::Wpa2Psk).unwrap();
    info.channel = 14;
    assert_eq!(Err(Error::InvalidChannel), adapter.set_ap_info(info.clone(), |_| {}));

    info.channel = 1;
    info.encryption = Encryption::Wep;
    assert_eq!(Err(Error::InvalidEncryption), adapter.set_ap_info(info, |_| {}));
}

#[test]
fn test_set_ap_info_mode_mismatch() {
    let mut adapter = ready_adapter(1);
    let info = ApInfo::new("esp_ap", "secret123", 5, Encryption::Wpa2Psk).unwrap();

    assert_eq!(Err(Error::ModeMismatch), adapter.set_ap_info(info, |_| {}));
}

#[test]
fn test_connect() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"2,CONNECT\r\n\r\nOK\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(2), eq(SocketAction::Connect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter
        .connect(2, Protocol::Tcp, "10.0.0.5", 80, results.callback())
        .unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(2)], results.values());
    assert!(adapter.is_connected(2));
    assert_eq!(Some(Protocol::Tcp), adapter.sockets().protocol(2));
    assert_eq!(
        vec!["AT+CIPSTART=2,\"TCP\",\"10.0.0.5\",80\r\n"],
        adapter.transport.written()
    );
}

#[test]
fn test_connect_confirmed_before_urc() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"\r\nOK\r\n0,CONNECT\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(0), eq(SocketAction::Connect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter
        .connect(0, Protocol::Udp, "10.0.0.5", 5000, results.callback())
        .unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(0)], results.values());
    assert_eq!(
        vec!["AT+CIPSTART=0,\"UDP\",\"10.0.0.5\",5000\r\n"],
        adapter.transport.written()
    );
}

#[test]
fn test_connect_in_use() {
    let mut adapter = ready_adapter(1);

    adapter.connect(1, Protocol::Tcp, "10.0.0.5", 80, |_| {}).unwrap();
    assert_eq!(
        Err(Error::SocketInUse),
        adapter.connect(1, Protocol::Tcp, "10.0.0.5", 80, |_| {})
    );
}

#[test]
fn test_connect_failed() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"\r\nERROR\r\n");

    let results = Results::new();
    adapter
        .connect(3, Protocol::Tcp, "10.0.0.5", 80, results.callback())
        .unwrap();
    assert!(adapter.sockets().is_in_use(3));

    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::Error)], results.values());
    assert!(!adapter.sockets().is_in_use(3));
    assert!(adapter.connect(3, Protocol::Tcp, "10.0.0.5", 80, |_| {}).is_ok());
}

#[test]
fn test_connect_timeout() {
    let mut adapter = ready_adapter(1);

    let results = Results::new();
    adapter
        .connect(3, Protocol::Tcp, "10.0.0.5", 80, results.callback())
        .unwrap();
    adapter.pump(100.millis());

    adapter.timer.advance(10_000);
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::Timeout)], results.values());
    assert!(!adapter.sockets().is_in_use(3));
}

#[test]
fn test_connect_already_connected() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"ALREADY CONNECTED\r\n\r\nERROR\r\n");

    let results = Results::new();
    adapter
        .connect(4, Protocol::Tcp, "10.0.0.5", 80, results.callback())
        .unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(4)], results.values());
    assert!(adapter.is_connected(4));
}

#[test]
fn test_connect_invalid_arguments() {
    let mut adapter = ready_adapter(1);
    let long_host = "a".repeat(65);
    let host_too_long_for_command = "a".repeat(60);

    assert_eq!(
        Err(Error::InvalidLinkId),
        adapter.connect(5, Protocol::Tcp, "10.0.0.5", 80, |_| {})
    );
    assert_eq!(
        Err(Error::InvalidHostLength),
        adapter.connect(0, Protocol::Tcp, "", 80, |_| {})
    );
    assert_eq!(
        Err(Error::InvalidHostLength),
        adapter.connect(0, Protocol::Tcp, &long_host, 80, |_| {})
    );
    assert_eq!(
        Err(Error::InvalidPort),
        adapter.connect(0, Protocol::Tcp, "10.0.0.5", 0, |_| {})
    );
    assert_eq!(
        Err(Error::CommandTooLong),
        adapter.connect(0, Protocol::Tcp, &host_too_long_for_command, 80, |_| {})
    );

    assert!(!adapter.sockets().is_in_use(0));
    adapter.pump(100.millis());
    assert!(adapter.transport.written().is_empty());
}

#[test]
fn test_send() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n> ");
    adapter.transport.add_reply(b"\r\nRecv 5 bytes\r\n\r\nSEND OK\r\n");

    let results = Results::new();
    adapter.send(2, b"HELLO", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(5)], results.values());
    assert_eq!(vec!["AT+CIPSEND=2,5\r\n", "HELLO"], adapter.transport.written());
}

#[test]
fn test_send_split_prompt() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n> ");
    adapter.transport.add_reply(b"\r\nSEND OK\r\n");
    adapter.transport.limit_reads(1);

    let results = Results::new();
    adapter.send(2, b"HELLO", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(5)], results.values());
}

#[test]
fn test_send_invalid_arguments() {
    let mut adapter = connected_adapter(2);

    assert_eq!(Err(Error::SocketUnconnected), adapter.send(3, b"HELLO", |_| {}));
    assert_eq!(Err(Error::InvalidLinkId), adapter.send(7, b"HELLO", |_| {}));
    assert_eq!(Err(Error::InvalidPayloadLength), adapter.send(2, b"", |_| {}));
    assert_eq!(Err(Error::InvalidPayloadLength), adapter.send(2, &[0x0; 65], |_| {}));
    assert!(adapter.send(2, &[0x0; 64], |_| {}).is_ok());
}

#[test]
fn test_send_failed() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n> ");
    adapter.transport.add_reply(b"\r\nSEND FAIL\r\n");

    let results = Results::new();
    adapter.send(2, b"HELLO", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::SendFailed)], results.values());
}

#[test]
fn test_send_partial() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n> ");
    adapter.transport.add_reply(b"\r\nRecv 3 bytes\r\n\r\nSEND OK\r\n");

    let results = Results::new();
    adapter.send(2, b"HELLO", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::PartialSend)], results.values());
}

#[test]
fn test_send_rejected_before_prompt() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"link is not valid\r\n\r\nERROR\r\n");

    let results = Results::new();
    adapter.send(2, b"HELLO", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::Error)], results.values());
    assert_eq!(vec!["AT+CIPSEND=2,5\r\n"], adapter.transport.written());
}

#[test]
fn test_send_confirmation_timeout() {
    let mut adapter = connected_adapter(2);
    adapter.set_send_timeout_ms(1_000);
    adapter.transport.add_reply(b"\r\nOK\r\n> ");

    let results = Results::new();
    adapter.send(2, b"HELLO", results.callback()).unwrap();
    adapter.pump(100.millis());

    adapter.timer.advance(999);
    adapter.pump(100.millis());
    assert!(results.values().is_empty());

    adapter.timer.advance(1);
    adapter.pump(100.millis());
    assert_eq!(vec![Err(CommandError::Timeout)], results.values());
}

#[test]
fn test_data_received() {
    let mut adapter = connected_adapter(2);

    let mut hooks = MockHooks::new();
    hooks
        .expect_data_received()
        .withf(|link_id: &usize, data: &[u8]| *link_id == 2 && data == b"HELLO")
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    adapter.transport.add_response(b"\r\n+IPD,2,5:HELLO\r\n");
    adapter.pump(100.millis());

    assert_eq!(0, adapter.sockets().pending_bytes(2));
}

#[test]
fn test_data_received_during_command() {
    let mut adapter = connected_adapter(2);
    adapter
        .transport
        .add_reply(b"+CIFSR:STAIP,\"10.0.0.181\"\r\n+IPD,2,5:HELLO\r\n\r\nOK\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_data_received()
        .withf(|link_id: &usize, data: &[u8]| *link_id == 2 && data == b"HELLO")
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter.get_ip_info(results.callback()).unwrap();
    adapter.pump(100.millis());

    let expected = IpInfo {
        client: Some(Ipv4Addr::new(10, 0, 0, 181)),
        ap: None,
    };
    assert_eq!(vec![Ok(expected)], results.values());
}

#[test]
fn test_data_split_into_chunks() {
    let mut adapter = connected_adapter(0);

    let mut hooks = MockHooks::new();
    hooks
        .expect_data_received()
        .withf(|link_id: &usize, data: &[u8]| *link_id == 0 && data == b"0123456789abcdef")
        .times(1)
        .return_const(());
    hooks
        .expect_data_received()
        .withf(|link_id: &usize, data: &[u8]| *link_id == 0 && data == b"ghij")
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    adapter.transport.add_response(b"+IPD,0,20:0123456789abcdefghij");
    adapter.pump(100.millis());
}

#[test]
fn test_invalid_data_counted() {
    let mut adapter = ready_adapter(1);

    adapter.transport.add_response(b"+IPD,9,3:abc\r\n+IPD,x:\r\n");
    adapter.pump(100.millis());

    assert_eq!(2, adapter.parse_errors());
}

#[test]
fn test_close() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"2,CLOSED\r\n\r\nOK\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(2), eq(SocketAction::Disconnect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter.close(2, results.callback()).unwrap();
    assert_eq!(Err(Error::SocketInUse), adapter.close(2, |_| {}));

    adapter.pump(100.millis());

    assert_eq!(vec![Ok(())], results.values());
    assert!(!adapter.sockets().is_in_use(2));
    assert_eq!(SocketAction::Disconnect, adapter.sockets().last_action(2));
    assert_eq!(vec!["AT+CIPCLOSE=2\r\n"], adapter.transport.written());
}

#[test]
fn test_close_failed_frees_link() {
    let mut adapter = connected_adapter(1);
    adapter.transport.add_reply(b"\r\nERROR\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(1), eq(SocketAction::Disconnect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter.close(1, results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Err(CommandError::Error)], results.values());
    assert!(!adapter.sockets().is_in_use(1));
}

#[test]
fn test_close_invalid_arguments() {
    let mut adapter = connected_adapter(1);

    assert_eq!(Err(Error::SocketUnconnected), adapter.close(0, |_| {}));
    assert_eq!(Err(Error::InvalidLinkId), adapter.close(9, |_| {}));

    adapter.connect(0, Protocol::Tcp, "10.0.0.5", 80, |_| {}).unwrap();
    assert_eq!(Err(Error::SocketInUse), adapter.close(0, |_| {}));
}

#[test]
fn test_closed_by_remote() {
    let mut adapter = connected_adapter(3);

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(3), eq(SocketAction::Disconnect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    adapter.transport.add_response(b"3,CLOSED\r\n3,CLOSED\r\n");
    adapter.pump(100.millis());

    assert!(!adapter.is_connected(3));
    assert_eq!(Err(Error::SocketUnconnected), adapter.send(3, b"HELLO", |_| {}));
}

#[test]
fn test_server() {
    let mut adapter = ready_adapter(3);
    adapter.transport.add_reply(b"\r\nOK\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(0), eq(SocketAction::Connect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    let results = Results::new();
    adapter.server(ServerAction::Create, 8080, results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(())], results.values());
    assert_eq!(Some(8080), adapter.server_port());
    assert_eq!(vec!["AT+CIPSERVER=1,8080\r\n"], adapter.transport.written());

    adapter.transport.add_response(b"0,CONNECT\r\n");
    adapter.pump(100.millis());

    assert!(adapter.is_connected(0));
    assert_eq!(None, adapter.sockets().protocol(0));
    assert_eq!(None, adapter.sockets().remote(0));
}

#[test]
fn test_server_delete() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"\r\nOK\r\n");
    adapter.transport.add_reply(b"\r\nOK\r\n");

    adapter.server(ServerAction::Create, 80, |_| {}).unwrap();
    adapter.server(ServerAction::Delete, 0, |_| {}).unwrap();
    adapter.pump(100.millis());

    assert_eq!(None, adapter.server_port());
    assert_eq!(
        vec!["AT+CIPSERVER=1,80\r\n", "AT+CIPSERVER=0\r\n"],
        adapter.transport.written()
    );
}

#[test]
fn test_server_invalid_port() {
    let mut adapter = ready_adapter(1);
    assert_eq!(Err(Error::InvalidPort), adapter.server(ServerAction::Create, 0, |_| {}));
}

#[test]
fn test_unexpected_restart() {
    let mut adapter = connected_adapter(2);
    adapter.transport.add_reply(b"\r\nOK\r\n");
    adapter.server(ServerAction::Create, 80, |_| {}).unwrap();
    adapter.transport.add_response(b"WIFI CONNECTED\r\n");
    adapter.pump(100.millis());
    assert_eq!(Some(80), adapter.server_port());

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(2), eq(SocketAction::Disconnect))
        .times(1)
        .return_const(());
    adapter.register_hooks(hooks);

    adapter.transport.clear_written();
    adapter.transport.add_response(b"\r\n ets Jan  8 2013,rst cause:2\r\n\r\nready\r\n");
    adapter.transport.add_reply(b"ATE0\r\r\n\r\nOK\r\n");
    adapter.transport.add_reply(b"\r\nOK\r\n");
    adapter.transport.add_reply(b"+CWMODE:3\r\n\r\nOK\r\n");
    adapter.pump(100.millis());

    assert!(!adapter.is_connected(2));
    assert_eq!(None, adapter.server_port());
    assert_eq!(JoinState::default(), adapter.join_status());
    assert_eq!(InitState::Ready, adapter.init_state());
    assert_eq!(OpMode::Both, adapter.op_mode());
    assert_eq!(
        vec!["ATE0\r\n", "AT+CIPMUX=1\r\n", "AT+CWMODE?\r\n"],
        adapter.transport.written()
    );
    assert_eq!(0, adapter.pending_commands());
}

#[test]
fn test_unexpected_restart_then_connect() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_response(b"ready\r\n");
    adapter.transport.add_reply(b"\r\nOK\r\n");
    adapter.transport.add_reply(b"\r\nOK\r\n");
    adapter.transport.add_reply(b"+CWMODE:1\r\n\r\nOK\r\n");
    adapter.transport.add_reply(b"2,CONNECT\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.pump(100.millis());
    adapter
        .connect(2, Protocol::Tcp, "10.0.0.5", 80, results.callback())
        .unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(2)], results.values());
    assert_eq!(
        vec![
            "ATE0\r\n",
            "AT+CIPMUX=1\r\n",
            "AT+CWMODE?\r\n",
            "AT+CIPSTART=2,\"TCP\",\"10.0.0.5\",80\r\n"
        ],
        adapter.transport.written()
    );
}

#[test]
fn test_unexpected_restart_recovery_failed() {
    let mut adapter = connected_adapter(0);
    adapter.transport.add_response(b"ready\r\n");
    adapter.transport.add_reply(b"\r\nOK\r\n");
    adapter.transport.add_reply(b"\r\nERROR\r\n");
    adapter.transport.add_reply(b"\r\nERROR\r\n");
    adapter.transport.add_reply(b"\r\nERROR\r\n");
    adapter.pump(100.millis());

    assert_eq!(InitState::Failed, adapter.init_state());
    assert_eq!(Err(Error::NotReady), adapter.connect(0, Protocol::Tcp, "10.0.0.5", 80, |_| {}));
}

#[test]
fn test_single_command_in_flight() {
    let mut adapter = ready_adapter(1);

    adapter.get_ip_info(|_| {}).unwrap();
    adapter.get_op_mode(|_| {}).unwrap();
    assert_eq!(2, adapter.pending_commands());

    adapter.pump(100.millis());
    adapter.pump(100.millis());

    assert_eq!(vec!["AT+CIFSR\r\n"], adapter.transport.written());
    assert_eq!(2, adapter.pending_commands());

    adapter.transport.add_response(b"\r\nOK\r\n");
    adapter.pump(100.millis());
    assert_eq!(1, adapter.pending_commands());
}

#[test]
fn test_completion_order() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"+CIFSR:STAIP,\"10.0.0.181\"\r\n\r\nOK\r\n");
    adapter.transport.add_reply(b"+CWMODE:1\r\n\r\nOK\r\n");
    adapter.transport.add_reply(b"\r\nOK\r\n");

    let order = Results::new();
    let first = order.callback();
    let second = order.callback();
    let third = order.callback();

    adapter.get_ip_info(move |_| first("ip")).unwrap();
    adapter.get_op_mode(move |_| second("mode")).unwrap();
    adapter.set_op_mode(OpMode::Client, move |_| third("set")).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec!["ip", "mode", "set"], order.values());
    assert_eq!(
        vec!["AT+CIFSR\r\n", "AT+CWMODE?\r\n", "AT+CWMODE=1\r\n"],
        adapter.transport.written()
    );
}

#[test]
fn test_queue_full() {
    let mut adapter = ready_adapter(1);
    adapter.set_queue_capacity(2);

    adapter.get_ip_info(|_| {}).unwrap();
    adapter.get_op_mode(|_| {}).unwrap();
    assert_eq!(Err(Error::QueueFull), adapter.get_op_mode(|_| {}));

    // Command in flight does not count
    adapter.pump(100.millis());
    assert!(adapter.get_op_mode(|_| {}).is_ok());
}

#[test]
fn test_pump_budget() {
    let mut adapter = ready_adapter(1);
    adapter.transport.limit_reads(4);
    adapter.timer.auto_advance(1);

    adapter.transport.add_response(b"WIFI CONNECTED\r\n");
    adapter.pump(2.millis());

    assert_eq!(8, adapter.transport.pending());
    assert!(!adapter.join_status().connected);

    adapter.pump(2.millis());

    assert_eq!(0, adapter.transport.pending());
    assert!(adapter.join_status().connected);
}

#[test]
fn test_pump_zero_budget_progress() {
    let mut adapter = ready_adapter(1);
    adapter.transport.limit_reads(4);

    adapter.transport.add_response(b"WIFI CONNECTED\r\n");
    adapter.pump(0.millis());

    assert_eq!(12, adapter.transport.pending());
}

#[test]
fn test_split_reads() {
    let mut adapter = ready_adapter(1);
    adapter.transport.limit_reads(1);
    adapter
        .transport
        .add_reply(b"WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.join("test_wifi", "secret", results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(())], results.values());
    assert!(adapter.join_status().ip_assigned);
}

#[test]
fn test_busy_ignored() {
    let mut adapter = ready_adapter(1);
    adapter.transport.add_reply(b"busy p...\r\n+CWMODE:2\r\n\r\nOK\r\n");

    let results = Results::new();
    adapter.get_op_mode(results.callback()).unwrap();
    adapter.pump(100.millis());

    assert_eq!(vec![Ok(OpMode::Ap)], results.values());
}

#[test]
fn test_size_limits() {
    let mut transport = MockTransport::new();
    transport.add_init_replies(1);
    transport.add_reply(b"0,CONNECT\r\n\r\nOK\r\n+IPD,0,2:OK\r\n");

    let mut hooks = MockHooks::new();
    hooks
        .expect_socket_state_changed()
        .with(eq(0), eq(SocketAction::Connect))
        .times(1)
        .return_const(());
    hooks
        .expect_data_received()
        .withf(|link_id: &usize, data: &[u8]| *link_id == 0 && data.len() == 1)
        .times(2)
        .return_const(());

    let mut adapter: Adapter<MockTransport, FakeTimer, 1_000, 2_048, 1> = Adapter::new(transport, FakeTimer::default());
    adapter.register_hooks(hooks);
    adapter.init(64, |_| {}).unwrap();
    adapter.pump(100.millis());
    adapter.connect(0, Protocol::Tcp, "10.0.0.5", 80, |_| {}).unwrap();
    adapter.pump(100.millis());

    assert!(adapter.send(0, &[0x55; 2_048], |_| {}).is_ok());
    assert_eq!(Err(Error::InvalidPayloadLength), adapter.send(0, &[0x55; 2_049], |_| {}));
}
