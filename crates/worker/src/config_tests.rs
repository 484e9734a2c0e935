// SPDX-License-Identifier: MIT

use super::*;

use yare::parameterized;

#[parameterized(
    primary = { "bridge-42", "/run/hl/bridge-42.sock" },
    callback = { "bridge-42-cb", "/run/hl/bridge-42-cb.sock" },
    management = { "bridge-42-mgmt", "/run/hl/bridge-42-mgmt.sock" },
)]
fn socket_paths_derive_from_endpoint_name(name: &str, expected: &str) {
    let config = Config::new("bridge-42", "/opt/lang").with_socket_dir("/run/hl");
    let path = match name {
        n if n.ends_with("-cb") => config.callback_socket(),
        n if n.ends_with("-mgmt") => config.management_socket(),
        _ => config.primary_socket(),
    };
    assert_eq!(path, PathBuf::from(expected));
}

#[test]
fn runtime_home_is_kept_verbatim() {
    let config = Config::new("x", "/usr/lib/R");
    assert_eq!(config.runtime_home, PathBuf::from("/usr/lib/R"));
}

#[test]
fn derived_names_share_the_socket_directory() {
    let config = Config::new("e", "/tmp").with_socket_dir("/d");
    for path in [config.primary_socket(), config.callback_socket(), config.management_socket()] {
        assert_eq!(path.parent(), Some(std::path::Path::new("/d")));
    }
}

#[test]
fn intervals_have_sane_defaults() {
    assert!(idle_tick() >= POLL_SLEEP);
    assert!(callback_timeout() > idle_tick());
}
