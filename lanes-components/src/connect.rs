// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Helper connection macros
//!
//! Components expose `connect_port_<name>` functions for their output ports
//! and `port_<name>` functions for their input ports. Arrays of ports use an
//! `_i` suffix and take an index. [`connect_port!`](crate::connect_port)
//! builds the right call from the port names and returns a `SimResult`.

pub use paste::paste;

#[macro_export]
/// Connect an [OutPort](lanes_engine::port::OutPort) port to an
/// [InPort](lanes_engine::port::InPort)
macro_rules! connect_port {
    ($from:expr, $from_port_name:ident => $to:expr, $to_port_name:ident) => {{
        lanes_track::debug!($from.entity ; "Connect {}.{} => {}.{}", $from, stringify!($from_port_name), $to, stringify!($to_port_name));
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name >]($to.[< port_ $to_port_name >]())
        }
    }};
    ($from:expr, $from_port_name:ident, $from_index:expr => $to:expr, $to_port_name:ident) => {{
        let from_index: usize = $from_index;
        lanes_track::debug!($from.entity ; "Connect {}.{}[{}] => {}.{}", $from, stringify!($from_port_name), from_index, $to, stringify!($to_port_name));
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name _i >](from_index, $to.[< port_ $to_port_name >]())
        }
    }};
    ($from:expr, $from_port_name:ident => $to:expr, $to_port_name:ident, $to_index:expr) => {{
        let to_index: usize = $to_index;
        lanes_track::debug!($from.entity ; "Connect {}.{} => {}.{}[{}]", $from, stringify!($from_port_name), $to, stringify!($to_port_name), to_index);
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name >]($to.[< port_ $to_port_name _i >](to_index))
        }
    }};
    ($from:expr, $from_port_name:ident, $from_index:expr => $to:expr, $to_port_name:ident, $to_index:expr) => {{
        let from_index: usize = $from_index;
        let to_index: usize = $to_index;
        lanes_track::debug!($from.entity ; "Connect {}.{}[{}] => {}.{}[{}]", $from, stringify!($from_port_name), from_index, $to, stringify!($to_port_name), to_index);
        $crate::connect::paste! {
            $from.[< connect_port_ $from_port_name _i >](from_index, $to.[< port_ $to_port_name _i >](to_index))
        }
    }};
}

#[macro_export]
/// Connect a tx port stored in a `RefCell<Option<>>`.
///
/// Fails once the port has been taken by `run()`.
macro_rules! connect_tx {
    ($component:expr, $fn:ident ; $port_state:ident) => {
        match $component.borrow_mut().as_mut() {
            Some(port) => port.$fn($port_state),
            None => lanes_engine::sim_error!("{} already running", stringify!($component)),
        }
    };
}

#[macro_export]
/// Access an rx port stored in a `RefCell<Option<>>`.
macro_rules! port_rx {
    ($component:expr, $fn:ident) => {
        match $component.borrow().as_ref() {
            Some(port) => port.$fn(),
            None => lanes_engine::sim_error!("{} already running", stringify!($component)),
        }
    };
}

#[macro_export]
/// Take a variable out of a `RefCell<Option<>>`, returning an error from the
/// enclosing function if it has already been taken.
macro_rules! take_option {
    ($var:expr) => {
        match $var.borrow_mut().take() {
            Some(value) => value,
            None => return lanes_engine::sim_error!("{} already taken", stringify!($var)),
        }
    };
}
