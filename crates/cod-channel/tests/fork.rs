#![cfg(unix)]

//! Channels shared with a forked child.
//!
//! Each test forks once; the child only touches the inherited channel and
//! leaves through `_exit` so no test-harness state runs twice.

use std::time::Duration;

use cod_channel::{ChannelError, Context, Identifier, JsonSerializer};
use cod_transport::TcpAcceptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
enum Message {
    Text(String),
    Pid(u32),
}

fn wait_child(pid: libc::pid_t) -> i32 {
    let mut status = 0;
    let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
    assert_eq!(rc, pid, "waitpid failed");
    assert!(libc::WIFEXITED(status), "child did not exit normally");
    libc::WEXITSTATUS(status)
}

fn child_exit(ok: bool) -> ! {
    unsafe { libc::_exit(if ok { 0 } else { 1 }) }
}

#[test]
fn child_writes_parent_reads() {
    let ctx = Context::new();
    let mut chan = ctx.pipe(JsonSerializer::<Message>::new()).unwrap();

    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        let ok = chan.put(&Message::Text("test".into())).is_ok()
            && chan.put(&Message::Pid(std::process::id())).is_ok();
        child_exit(ok);
    }

    assert_eq!(chan.get().unwrap(), Message::Text("test".into()));
    assert_eq!(chan.get().unwrap(), Message::Pid(pid as u32));
    assert_eq!(wait_child(pid), 0);

    // The child's write handle is gone and the parent released its own.
    assert!(matches!(chan.get(), Err(ChannelError::EndOfStream)));
}

#[test]
fn child_resolves_identifier_from_inherited_context() {
    let ctx = Context::new();
    let (mut control_rx, mut control_tx) = ctx
        .pipe(JsonSerializer::<Identifier>::new())
        .unwrap()
        .split()
        .unwrap();
    let mut data = ctx.pipe(JsonSerializer::<String>::new()).unwrap();

    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        drop(control_tx);
        let ok = match control_rx.get() {
            Ok(id) => match ctx.resolve(&id, JsonSerializer::<String>::new()) {
                Ok(mut reply) => reply.put(&format!("hello from {}", id.pid)).is_ok(),
                Err(_) => false,
            },
            Err(_) => false,
        };
        child_exit(ok);
    }

    drop(control_rx);
    control_tx.put(&data.identifier()).unwrap();
    assert_eq!(
        data.get().unwrap(),
        format!("hello from {}", std::process::id())
    );
    assert_eq!(wait_child(pid), 0);
}

#[test]
fn child_writes_over_tcp_after_parent_releases_its_writer() {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0").unwrap();
    let addr = acceptor.local_addr().unwrap();
    let server = std::thread::spawn(move || {
        let ctx = Context::new();
        let mut chan = ctx
            .accept(&acceptor, JsonSerializer::<Message>::new())
            .unwrap();
        chan.get()
    });

    let ctx = Context::new();
    let mut chan = ctx.connect(addr, JsonSerializer::<Message>::new()).unwrap();

    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        // Give the parent time to dedicate its copy to reading first.
        std::thread::sleep(Duration::from_millis(200));
        let ok = chan.put(&Message::Pid(std::process::id())).is_ok();
        child_exit(ok);
    }

    // Dedicating to reading drops the parent's write side. The connection
    // stays writable for the child, and this read only ends once the server
    // has closed and the child has exited.
    let parent_read = chan.get();
    assert_eq!(wait_child(pid), 0);
    assert_eq!(server.join().unwrap().unwrap(), Message::Pid(pid as u32));
    assert!(matches!(parent_read, Err(ChannelError::EndOfStream)));
}
