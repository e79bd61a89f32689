use crate::stack::{ConnectionState, Protocol, Remote, SocketAction, SocketTable, MAX_SOCKETS};
use core::str::FromStr;
use heapless::String;

fn remote() -> Remote {
    Remote {
        host: String::from_str("10.0.0.5").unwrap(),
        port: 80,
    }
}

fn connected_table(link_id: usize) -> SocketTable {
    let mut table = SocketTable::default();
    table.begin_connect(link_id, Protocol::Tcp, remote());
    assert!(table.mark_connected(link_id));
    table
}

#[test]
fn test_default_closed() {
    let table = SocketTable::default();

    for link_id in 0..MAX_SOCKETS {
        assert!(!table.is_in_use(link_id));
        assert!(!table.is_connected(link_id));
        assert_eq!(SocketAction::Unknown, table.last_action(link_id));
    }
}

#[test]
fn test_begin_connect() {
    let mut table = SocketTable::default();
    table.begin_connect(2, Protocol::Udp, remote());

    assert!(table.is_in_use(2));
    assert!(!table.is_connected(2));
    assert_eq!(Some(ConnectionState::Connecting), table.state(2));
    assert_eq!(Some(Protocol::Udp), table.protocol(2));
    assert_eq!(Some(&remote()), table.remote(2));
}

#[test]
fn test_mark_connected_once() {
    let mut table = connected_table(1);

    assert!(table.is_connected(1));
    assert_eq!(SocketAction::Connect, table.last_action(1));
    assert!(!table.mark_connected(1));
}

#[test]
fn test_mark_connected_accepted_by_server() {
    let mut table = SocketTable::default();

    assert!(table.mark_connected(3));
    assert!(table.is_connected(3));
    assert_eq!(None, table.protocol(3));
    assert_eq!(None, table.remote(3));
}

#[test]
fn test_mark_closed_once() {
    let mut table = connected_table(0);

    assert!(table.mark_closed(0));
    assert!(!table.is_in_use(0));
    assert_eq!(SocketAction::Disconnect, table.last_action(0));
    assert_eq!(None, table.remote(0));

    assert!(!table.mark_closed(0));
}

#[test]
fn test_mark_closed_while_closing() {
    let mut table = connected_table(4);
    table.begin_close(4);

    assert_eq!(Some(ConnectionState::Closing), table.state(4));
    assert!(table.is_in_use(4));
    assert!(!table.is_connected(4));

    assert!(table.mark_closed(4));
    assert!(!table.is_in_use(4));
}

#[test]
fn test_mark_closed_while_connecting_keeps_link() {
    let mut table = SocketTable::default();
    table.begin_connect(1, Protocol::Tcp, remote());

    assert!(!table.mark_closed(1));
    assert_eq!(Some(ConnectionState::Connecting), table.state(1));
}

#[test]
fn test_abort_connect() {
    let mut table = SocketTable::default();
    table.begin_connect(1, Protocol::Tcp, remote());
    table.abort_connect(1);

    assert!(!table.is_in_use(1));
    assert_eq!(None, table.protocol(1));
}

#[test]
fn test_abort_connect_keeps_connected_link() {
    let mut table = connected_table(1);
    table.abort_connect(1);

    assert!(table.is_connected(1));
}

#[test]
fn test_begin_close_requires_connected() {
    let mut table = SocketTable::default();
    table.begin_close(0);

    assert_eq!(Some(ConnectionState::Closed), table.state(0));
}

#[test]
fn test_close_all() {
    let mut table = connected_table(1);
    assert!(table.mark_connected(3));
    table.begin_connect(4, Protocol::Tcp, remote());

    let closed = table.close_all();

    assert_eq!(&[1, 3], closed.as_slice());
    for link_id in 0..MAX_SOCKETS {
        assert!(!table.is_in_use(link_id));
    }
}

#[test]
fn test_pending_bytes() {
    let mut table = connected_table(2);

    table.announce_data(2, 10);
    assert_eq!(10, table.pending_bytes(2));

    table.consume_data(2, 4);
    assert_eq!(6, table.pending_bytes(2));

    table.consume_data(2, 8);
    assert_eq!(0, table.pending_bytes(2));
}

#[test]
fn test_invalid_link_ids_ignored() {
    let mut table = SocketTable::default();

    assert!(!table.mark_connected(MAX_SOCKETS));
    assert!(!table.mark_closed(MAX_SOCKETS));
    table.begin_connect(MAX_SOCKETS, Protocol::Tcp, remote());
    table.announce_data(MAX_SOCKETS, 4);

    assert!(!table.is_in_use(MAX_SOCKETS));
    assert_eq!(None, table.state(MAX_SOCKETS));
    assert_eq!(0, table.pending_bytes(MAX_SOCKETS));
    assert_eq!(SocketAction::Unknown, table.last_action(MAX_SOCKETS));
}

#[test]
fn test_protocol_as_str() {
    assert_eq!("TCP", Protocol::Tcp.as_str());
    assert_eq!("UDP", Protocol::Udp.as_str());
}
