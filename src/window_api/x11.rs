use std::{path::Path, time::Duration};

use anyhow::{anyhow, Result};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::instrument;
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{self, Atom, Drawable, GetProperty, GrabServer, InternAtom, UngrabServer, Window, ATOM_ANY},
    Connection, Xid,
};

use super::{FocusSample, FocusSampler};

/// Application name used when the focused window doesn't advertise its process.
const UNKNOWN_APPLICATION: &str = "Unknown";

fn intern(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_property(
    conn: &Connection,
    window: Window,
    property: Atom,
    long_length: u32,
) -> Result<x::GetPropertyReply> {
    Ok(conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length,
    }))?)
}

/// Executable name of a process, e.g. `firefox` for `/usr/lib/firefox/firefox`.
fn application_name(system: &mut System, id: u32) -> Option<String> {
    let pid = Pid::from_u32(id);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::everything(),
    );
    let process = system.process(pid)?;
    process
        .exe()
        .and_then(Path::file_name)
        .map(|v| v.to_string_lossy().into_owned())
        .or_else(|| Some(process.name().to_string_lossy().into_owned()))
}

pub struct X11FocusSampler {
    connection: Connection,
    root: Window,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
    system: System,
}

impl X11FocusSampler {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        // Currently the application only supports 1 x11 screen.
        let root = connection
            .get_setup()
            .roots()
            .nth(preferred_screen.max(0) as usize)
            .ok_or_else(|| anyhow!("X server has no screen {preferred_screen}"))?
            .root();
        let active_window_atom = intern(&connection, b"_NET_ACTIVE_WINDOW")?;
        let window_name_atom = intern(&connection, b"_NET_WM_NAME")?;
        let pid_atom = intern(&connection, b"_NET_WM_PID")?;
        Ok(Self {
            connection,
            root,
            active_window_atom,
            window_name_atom,
            pid_atom,
            system: System::new(),
        })
    }

    fn poll_inner(&mut self) -> Result<Option<FocusSample>> {
        let active = get_property(&self.connection, self.root, self.active_window_atom, 1)?;
        let Some(&window) = active.value::<Window>().first() else {
            return Ok(None);
        };
        if window.is_none() {
            return Ok(None);
        }

        let title = get_property(&self.connection, window, self.window_name_atom, 1024)?;
        let window_title = String::from_utf8_lossy(title.value::<u8>()).into_owned();

        let pid = get_property(&self.connection, window, self.pid_atom, 1)?;
        let app_name = pid
            .value::<u32>()
            .first()
            .and_then(|id| application_name(&mut self.system, *id))
            .unwrap_or_else(|| UNKNOWN_APPLICATION.to_string());

        Ok(Some(FocusSample::new(app_name, window_title)))
    }
}

impl FocusSampler for X11FocusSampler {
    #[instrument(skip(self))]
    fn poll(&mut self) -> Result<Option<FocusSample>> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.poll_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }

    #[instrument(skip(self))]
    fn idle_time(&mut self) -> Result<Duration> {
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(self.root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(Duration::from_millis(reply.ms_since_user_input().into()))
    }
}
