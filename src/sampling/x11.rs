use std::path::Path;

use anyhow::Result;
use sysinfo::Pid;
use tracing::instrument;
use xcb::{
    Connection, Xid,
    x::{self, ATOM_ANY, Atom, GetProperty, GrabServer, InternAtom, UngrabServer, Window},
};

use super::{ForegroundSnapshot, SamplePermissions, SampleSource};

fn get_pid_atom(conn: &Connection) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_WM_PID",
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    let result_slice = result.value::<u32>();
    if result_slice.is_empty() {
        return Ok(None);
    }
    Ok(Some(result_slice[0]))
}

fn get_process_path(id: u32) -> Result<Option<String>> {
    let system = sysinfo::System::new_all();
    let Some(process) = system.process(Pid::from_u32(id)) else {
        return Ok(None);
    };

    Ok(process
        .exe()
        .and_then(|v| v.to_str())
        .map(|v| v.to_string()))
}

fn get_active_window_atom(conn: &Connection) -> Result<Atom> {
    let active_window_atom = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_ACTIVE_WINDOW",
    }))?;
    Ok(active_window_atom.atom())
}

fn get_active_window(conn: &Connection, root: &Window, active_window_atom: Atom) -> Result<Window> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: *root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<Window>()[0])
}

fn get_net_wm_name_atom(conn: &Connection) -> Result<Atom> {
    let response = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name: b"_NET_WM_NAME",
    }))?;
    Ok(response.atom())
}

pub fn get_title(conn: &Connection, window: Window, wm_name_atom: Atom) -> Result<String> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property: wm_name_atom,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    Ok(String::from_utf8_lossy(wm_name.value()).to_string())
}

pub struct X11SampleSource {
    connection: Connection,
    preferred_screen: i32,
    active_window_atom: Atom,
    window_name_atom: Atom,
    pid_atom: Atom,
}

impl X11SampleSource {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) = xcb::Connection::connect(None)?;
        let active_window_atom = get_active_window_atom(&connection)?;
        let name_atom = get_net_wm_name_atom(&connection)?;
        let pid_atom = get_pid_atom(&connection)?;
        Ok(Self {
            connection,
            preferred_screen,
            active_window_atom,
            window_name_atom: name_atom,
            pid_atom,
        })
    }

    #[instrument(skip(self))]
    fn sample_inner(&self) -> Result<Option<ForegroundSnapshot>> {
        let setup = self.connection.get_setup();

        // Currently the application only supports 1 x11 screen.
        let default_window = setup
            .roots()
            .nth(self.preferred_screen.max(0) as usize)
            .unwrap()
            .root();

        let active_window =
            get_active_window(&self.connection, &default_window, self.active_window_atom)?;
        let title = get_title(&self.connection, active_window, self.window_name_atom)?;
        let Some(process_id) = get_pid(&self.connection, active_window, self.pid_atom)? else {
            return Ok(None);
        };
        let Some(owner_path) = get_process_path(process_id)? else {
            return Ok(None);
        };
        let owner_name = Path::new(&owner_path)
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_else(|| owner_path.clone());

        Ok(Some(ForegroundSnapshot {
            platform: "linux".into(),
            window_id: active_window.resource_id(),
            title: title.into(),
            owner_path: owner_path.into(),
            owner_process_id: process_id,
            owner_name: owner_name.into(),
            owner_bundle_id: None,
            url: None,
        }))
    }
}

impl SampleSource for X11SampleSource {
    #[instrument(skip(self))]
    fn sample(&mut self, _permissions: SamplePermissions) -> Result<Option<ForegroundSnapshot>> {
        assert!(self.preferred_screen >= 0);

        let _ = self.connection.send_request(&GrabServer {});

        let result = self.sample_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}
