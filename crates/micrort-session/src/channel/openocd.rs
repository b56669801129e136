//! OpenOCD channel.
//!
//! Talks to an OpenOCD Tcl server. Each command is sent as text terminated
//! by `0x1a`, and each reply is read up to the next `0x1a`. The server only
//! reports failures in reply text, so channel commands are wrapped in a Tcl
//! `catch` that answers with a status tag.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;

use micrort_targets::RegionKind;

use crate::channel::{stack_top, Channel, ChannelParams};
use crate::error::{Result, SessionError};

const TCL_TERMINATOR: u8 = 0x1a;
const OK_TAG: &str = "micrort-ok";
const ERROR_TAG: &str = "micrort-error:";

/// Request/response client for the OpenOCD Tcl RPC server.
#[derive(Debug)]
pub struct TclClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TclClient {
    pub fn connect(addr: &str, port: u16) -> std::io::Result<Self> {
        let stream = TcpStream::connect((addr, port))?;
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Send one command and return its reply without the terminator.
    pub fn command(&mut self, cmd: &str) -> std::io::Result<String> {
        log::debug!("openocd <- {cmd}");
        self.writer.write_all(cmd.as_bytes())?;
        self.writer.write_all(&[TCL_TERMINATOR])?;
        self.writer.flush()?;

        let mut reply = Vec::new();
        let n = self.reader.read_until(TCL_TERMINATOR, &mut reply)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "OpenOCD closed the connection",
            ));
        }
        if reply.last() == Some(&TCL_TERMINATOR) {
            reply.pop();
        }
        let reply = String::from_utf8_lossy(&reply).into_owned();
        log::debug!("openocd -> {reply}");
        Ok(reply)
    }
}

/// A runtime on a device behind an OpenOCD debug server.
#[derive(Debug)]
pub struct OpenOcdChannel {
    client: Option<TclClient>,
    stack_pointer: u64,
}

impl OpenOcdChannel {
    /// Connect, halt the target, and load the runtime image at the text base.
    pub fn open(params: &ChannelParams) -> Result<Self> {
        let mut client = TclClient::connect(&params.server_addr, params.server_port).map_err(|e| {
            open_error(format!(
                "cannot reach {}:{}: {e}",
                params.server_addr, params.server_port
            ))
        })?;

        let text = params
            .region(RegionKind::Text)
            .ok_or_else(|| open_error("layout has no text region".into()))?;
        let stack = params
            .region(RegionKind::Stack)
            .ok_or_else(|| open_error("layout has no stack region".into()))?;
        let stack_pointer = stack_top(stack.wire_base(), stack.size, params.word_size_bytes())
            .ok_or_else(|| open_error("stack region ends past the top of the address space".into()))?;

        let load = load_image_command(&params.runtime_obj_path, text.wire_base());
        for cmd in ["reset halt", load.as_str()] {
            run_checked(&mut client, cmd).map_err(|e| open_error(format!("'{cmd}' failed: {e}")))?;
        }

        Ok(Self {
            client: Some(client),
            stack_pointer,
        })
    }

    fn client(&mut self) -> Result<&mut TclClient> {
        self.client.as_mut().ok_or_else(|| SessionError::Channel {
            detail: "OpenOCD channel is closed".into(),
        })
    }

    fn run(&mut self, cmd: &str) -> Result<()> {
        run_checked(self.client()?, cmd).map_err(|e| SessionError::Channel {
            detail: format!("OpenOCD '{cmd}' failed: {e}"),
        })
    }
}

impl Channel for OpenOcdChannel {
    fn enter(&mut self) -> Result<()> {
        self.run("reset halt")?;
        let sp = format!("reg sp 0x{:x}", self.stack_pointer);
        self.run(&sp)?;
        Ok(())
    }

    fn exit(&mut self) -> Result<()> {
        self.run("halt")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.client()?;
        self.client = None;
        Ok(())
    }
}

/// Wrap `cmd` so the reply is [`OK_TAG`] or [`ERROR_TAG`] plus the message.
fn checked_command(cmd: &str) -> String {
    format!("if {{[catch {{{cmd}}} err]}} {{concat {ERROR_TAG} $err}} else {{concat {OK_TAG}}}")
}

/// Run a wrapped command and turn an error reply into `Err(message)`.
fn run_checked(client: &mut TclClient, cmd: &str) -> std::result::Result<(), String> {
    let reply = client.command(&checked_command(cmd)).map_err(|e| e.to_string())?;
    let reply = reply.trim();
    if reply == OK_TAG {
        Ok(())
    } else if let Some(message) = reply.strip_prefix(ERROR_TAG) {
        Err(message.trim().to_string())
    } else {
        Err(format!("unexpected reply '{reply}'"))
    }
}

fn load_image_command(path: &Path, offset: u64) -> String {
    format!("load_image {} 0x{:x} elf", path.display(), offset)
}

fn open_error(detail: String) -> SessionError {
    SessionError::Open {
        comms: "openocd".into(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micrort_targets::{CommsMethod, MemoryRegion};
    use std::io::Read;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// The command inside a [`checked_command`] wrapper.
    fn inner_command(wrapped: &str) -> String {
        wrapped
            .strip_prefix("if {[catch {")
            .and_then(|rest| rest.split_once("} err]}"))
            .map(|(cmd, _)| cmd.to_string())
            .unwrap_or_else(|| wrapped.to_string())
    }

    /// Fake OpenOCD: records every command and answers with `reply(cmd)`.
    fn fake_server_with(
        reply: impl Fn(&str) -> String + Send + 'static,
    ) -> (u16, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            let mut byte = [0u8; 1];
            while stream.read(&mut byte).map(|n| n > 0).unwrap_or(false) {
                if byte[0] == TCL_TERMINATOR {
                    let cmd = inner_command(&String::from_utf8_lossy(&buf));
                    buf.clear();
                    let mut answer = reply(&cmd).into_bytes();
                    answer.push(TCL_TERMINATOR);
                    let _ = tx.send(cmd);
                    if stream.write_all(&answer).is_err() {
                        break;
                    }
                } else {
                    buf.push(byte[0]);
                }
            }
        });
        (port, rx)
    }

    fn fake_server() -> (u16, mpsc::Receiver<String>) {
        fake_server_with(|_| OK_TAG.to_string())
    }

    fn params(port: u16) -> ChannelParams {
        ChannelParams {
            comms_method: CommsMethod::OpenOcd,
            runtime_obj_path: "/tmp/micrort_runtime.obj".into(),
            toolchain_prefix: "arm-none-eabi-".into(),
            regions: RegionKind::ALL
                .iter()
                .map(|&kind| MemoryRegion {
                    kind,
                    base: match kind {
                        RegionKind::Text => Some(0x2000_0180),
                        RegionKind::Stack => Some(0x2004_0000),
                        _ => None,
                    },
                    size: 0x100,
                })
                .collect(),
            word_size: 32,
            thumb_mode: true,
            server_addr: "127.0.0.1".into(),
            server_port: port,
        }
    }

    #[test]
    fn open_enter_exit_send_expected_commands() {
        let (port, rx) = fake_server();
        let mut channel = OpenOcdChannel::open(&params(port)).unwrap();
        channel.enter().unwrap();
        channel.exit().unwrap();
        channel.close().unwrap();

        let sent: Vec<String> = rx.iter().take(5).collect();
        assert_eq!(
            sent,
            vec![
                "reset halt".to_string(),
                "load_image /tmp/micrort_runtime.obj 0x20000180 elf".to_string(),
                "reset halt".to_string(),
                "reg sp 0x20040100".to_string(),
                "halt".to_string(),
            ]
        );
    }

    #[test]
    fn failed_load_image_is_open_error() {
        let (port, _rx) = fake_server_with(|cmd| {
            if cmd.starts_with("load_image") {
                format!("{ERROR_TAG} couldn't open /x: No such file or directory")
            } else {
                OK_TAG.to_string()
            }
        });
        let err = OpenOcdChannel::open(&params(port)).unwrap_err();
        match err {
            SessionError::Open { comms, detail } => {
                assert_eq!(comms, "openocd");
                assert!(detail.contains("No such file or directory"), "{detail}");
            }
            other => panic!("expected Open error, got {other:?}"),
        }
    }

    #[test]
    fn failed_enter_and_exit_are_channel_errors() {
        let (port, _rx) = fake_server_with(|cmd| {
            if cmd.starts_with("reg sp") || cmd == "halt" {
                format!("{ERROR_TAG} target not halted")
            } else {
                OK_TAG.to_string()
            }
        });
        let mut channel = OpenOcdChannel::open(&params(port)).unwrap();
        let err = channel.enter().unwrap_err();
        assert!(matches!(err, SessionError::Channel { ref detail } if detail.contains("not halted")));
        assert!(matches!(channel.exit(), Err(SessionError::Channel { .. })));
    }

    #[test]
    fn untagged_reply_is_rejected() {
        let (port, _rx) = fake_server_with(|_| "invalid command name \"reset\"".to_string());
        assert!(matches!(
            OpenOcdChannel::open(&params(port)),
            Err(SessionError::Open { .. })
        ));
    }

    #[test]
    fn stack_past_address_space_is_open_error() {
        let (port, _rx) = fake_server();
        let mut p = params(port);
        let stack = p.regions.iter_mut().find(|r| r.kind == RegionKind::Stack).unwrap();
        stack.base = Some(u64::MAX - 16);
        stack.size = 64;
        let err = OpenOcdChannel::open(&p).unwrap_err();
        assert!(matches!(err, SessionError::Open { ref detail, .. } if detail.contains("stack")));
    }

    #[test]
    fn closed_channel_rejects_use() {
        let (port, _rx) = fake_server();
        let mut channel = OpenOcdChannel::open(&params(port)).unwrap();
        channel.close().unwrap();
        assert!(matches!(channel.enter(), Err(SessionError::Channel { .. })));
        assert!(channel.close().is_err());
    }

    #[test]
    fn unreachable_server_is_open_error() {
        // Bind then drop to get a port with nothing listening.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = OpenOcdChannel::open(&params(port)).unwrap_err();
        assert!(matches!(err, SessionError::Open { ref comms, .. } if comms == "openocd"));
    }

    #[test]
    fn commands_are_wrapped_in_catch() {
        let wrapped = checked_command("halt");
        assert_eq!(
            wrapped,
            "if {[catch {halt} err]} {concat micrort-error: $err} else {concat micrort-ok}"
        );
        assert_eq!(inner_command(&wrapped), "halt");
    }

    #[test]
    fn unset_text_base_loads_at_zero_offset() {
        assert_eq!(
            load_image_command(Path::new("/x/rt.obj"), 0),
            "load_image /x/rt.obj 0x0 elf"
        );
    }
}
