//! Command port round trips over loopback TCP

mod common;

use common::{WAIT, fast_config, sim_loop, wait_until};
use gati::core::state::MovementState;
use gati::orchestrator::CommandRecord;
use gati::streaming::{ClientRegistry, CommandListener, FrameReader, encode_frame, write_frame};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const STATUS_PORT: u16 = 6556;

fn read_ack(stream: &mut TcpStream, reader: &mut FrameReader) -> Value {
    let payload = loop {
        if let Some(p) = reader.read_frame(stream).unwrap() {
            break p;
        }
    };
    serde_json::from_slice(&payload).unwrap()
}

#[test]
fn test_commands_acked_over_tcp() {
    let (mut control, sim) = sim_loop(fast_config());
    control.start().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let clients: ClientRegistry = Arc::new(Mutex::new(None));
    let listener = CommandListener::bind(
        "127.0.0.1:0",
        control.command_handle(),
        Arc::clone(&running),
        Arc::clone(&clients),
        STATUS_PORT,
        4096,
    )
    .unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || listener.run());

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut reader = FrameReader::new(4096);

    write_frame(
        &mut stream,
        &CommandRecord::new("navigate_to_station", json!({ "station": "dock" })),
    )
    .unwrap();
    let ack = read_ack(&mut stream, &mut reader);
    assert_eq!(ack["accepted"], true);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Navigating
    }));
    assert_eq!(
        *clients.lock(),
        Some(SocketAddr::new(addr.ip(), STATUS_PORT))
    );

    write_frame(
        &mut stream,
        &CommandRecord::new("navigate_to_station", json!({ "station": "attic" })),
    )
    .unwrap();
    let ack = read_ack(&mut stream, &mut reader);
    assert_eq!(ack["accepted"], false);
    assert!(ack["reason"].as_str().unwrap().contains("attic"));

    // Not a command record at all
    let garbage = b"{\"verb\":\"jump\"}";
    let mut frame = (garbage.len() as u32).to_be_bytes().to_vec();
    frame.extend_from_slice(garbage);
    stream.write_all(&frame).unwrap();
    let ack = read_ack(&mut stream, &mut reader);
    assert_eq!(ack["accepted"], false);

    write_frame(&mut stream, &CommandRecord::new("stop", Value::Null)).unwrap();
    let ack = read_ack(&mut stream, &mut reader);
    assert_eq!(ack["accepted"], true);
    assert!(wait_until(WAIT, || {
        control.status().state.movement == MovementState::Stopped
    }));
    assert!(sim.actuator.is_neutral());

    drop(stream);
    assert!(wait_until(WAIT, || clients.lock().is_none()));

    running.store(false, Ordering::Relaxed);
    server.join().unwrap().unwrap();
    control.stop().unwrap();
}

#[test]
fn test_second_client_rejected() {
    let (control, _sim) = sim_loop(fast_config());
    let running = Arc::new(AtomicBool::new(true));
    let clients: ClientRegistry = Arc::new(Mutex::new(None));
    let listener = CommandListener::bind(
        "127.0.0.1:0",
        control.command_handle(),
        Arc::clone(&running),
        Arc::clone(&clients),
        STATUS_PORT,
        4096,
    )
    .unwrap();
    let addr = listener.local_addr().unwrap();
    let server = thread::spawn(move || listener.run());

    let mut first = TcpStream::connect(addr).unwrap();
    first
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    assert!(wait_until(WAIT, || clients.lock().is_some()));

    let mut second = TcpStream::connect(addr).unwrap();
    second
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut reader = FrameReader::new(4096);
    assert!(reader.read_frame(&mut second).is_err());

    // The first client is still served
    let mut reader = FrameReader::new(4096);
    first
        .write_all(&encode_frame(&CommandRecord::new("stop", Value::Null)).unwrap())
        .unwrap();
    assert_eq!(read_ack(&mut first, &mut reader)["accepted"], true);

    drop(first);
    running.store(false, Ordering::Relaxed);
    server.join().unwrap().unwrap();
}
