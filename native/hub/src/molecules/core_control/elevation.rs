// 内核提权与防火墙命令
//
// 只负责调用系统工具，授权机制本身由操作系统完成：
// - macOS：osascript 弹出系统授权框，将内核设为 root 所有并加 setuid
// - Linux 等：sudo -S 读取密码后执行 setcap
// - Windows：PowerShell 重建入站放行规则

use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::CoreError;
use crate::atoms::{ElevationStrategy, Platform};

// 内核管理网卡、路由与 DNS 所需的能力
pub const CORE_CAPABILITIES: &str = "cap_net_bind_service,cap_net_admin,cap_sys_ptrace,cap_dac_read_search,cap_dac_override,cap_net_raw=+ep";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// 路径会被拼进脚本字符串，含引号或反斜杠的路径直接拒绝
pub fn script_safe_path(path: &Path) -> Result<String, CoreError> {
    let text = path.to_string_lossy().to_string();
    if text.is_empty() {
        return Err(CoreError::CommandFailed("内核路径为空".to_string()));
    }
    if text.contains('"') || text.contains('`') || (!cfg!(windows) && text.contains('\\')) {
        return Err(CoreError::CommandFailed(format!(
            "内核路径包含不支持的字符：{}",
            text
        )));
    }
    Ok(text)
}

// osascript 参数
pub fn macos_grant_script(core_path: &Path) -> Result<String, CoreError> {
    let path = script_safe_path(core_path)?;
    Ok(format!(
        r#"do shell script "chown root:admin \"{path}\" && chmod +sx \"{path}\"" with administrator privileges"#
    ))
}

// sudo 参数，-k 保证密码一定从 stdin 读取
pub fn linux_grant_args(core_path: &Path) -> Result<Vec<String>, CoreError> {
    let path = script_safe_path(core_path)?;
    Ok(vec![
        "-S".to_string(),
        "-k".to_string(),
        "-p".to_string(),
        String::new(),
        "setcap".to_string(),
        CORE_CAPABILITIES.to_string(),
        path,
    ])
}

// PowerShell 脚本：先删后建，规则名取内核文件名
pub fn firewall_script(core_path: &Path) -> Result<String, CoreError> {
    let path = script_safe_path(core_path)?;
    let rule_name = core_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "mihomo".to_string());

    Ok(format!(
        "Remove-NetFirewallRule -DisplayName \"{rule_name}\" -ErrorAction SilentlyContinue; \
         New-NetFirewallRule -DisplayName \"{rule_name}\" -Direction Inbound -Action Allow \
         -Program \"{path}\" -Enabled True -Profile Any -ErrorAction Stop | Out-Null"
    ))
}

// 提权方式必须与当前系统一致，否则调用的系统工具不存在
pub fn check_grant_host(strategy: ElevationStrategy, host: Platform) -> Result<(), CoreError> {
    match (strategy, host) {
        (ElevationStrategy::DirectGrant, Platform::MacOs) => Ok(()),
        (ElevationStrategy::PasswordGrant, Platform::Linux | Platform::Other) => Ok(()),
        (ElevationStrategy::FirewallReset, _) => Err(CoreError::Unsupported(
            "Windows 使用防火墙重设代替内核授权".to_string(),
        )),
        (strategy, host) => Err(CoreError::Unsupported(format!(
            "{} 不支持 {:?} 授权",
            host.as_str(),
            strategy
        ))),
    }
}

pub async fn grant_core_permission(
    core_path: &Path,
    strategy: ElevationStrategy,
    secret: Option<&str>,
) -> Result<(), CoreError> {
    check_grant_host(strategy, Platform::current())?;

    if strategy == ElevationStrategy::DirectGrant {
        let script = macos_grant_script(core_path)?;
        log::info!("请求系统授权内核：{}", core_path.display());
        let mut command = Command::new("osascript");
        command.arg("-e").arg(script);
        return run_command(command, None, "osascript").await;
    }

    let secret = secret.ok_or_else(|| CoreError::CommandFailed("需要管理员密码".to_string()))?;
    let args = linux_grant_args(core_path)?;
    log::info!("通过 sudo 授权内核：{}", core_path.display());
    let mut command = Command::new("sudo");
    command.args(args);
    run_command(command, Some(secret), "sudo setcap").await
}

pub async fn setup_firewall(core_path: &Path) -> Result<(), CoreError> {
    if !cfg!(windows) {
        return Err(CoreError::Unsupported("防火墙重设仅用于 Windows".to_string()));
    }

    let script = firewall_script(core_path)?;
    log::info!("重设内核防火墙规则：{}", core_path.display());

    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    #[cfg(windows)]
    command.creation_flags(CREATE_NO_WINDOW);

    run_command(command, None, "powershell").await
}

// 执行命令并把非零退出码转换为错误，stdin 只在需要时写入
async fn run_command(
    mut command: Command,
    stdin_line: Option<&str>,
    label: &str,
) -> Result<(), CoreError> {
    command
        .stdin(if stdin_line.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| CoreError::CommandFailed(format!("启动 {} 失败：{}", label, e)))?;

    if let Some(line) = stdin_line
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| CoreError::CommandFailed(format!("写入 {} 输入失败：{}", label, e)))?;
        drop(stdin);
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| CoreError::CommandFailed(format!("等待 {} 退出失败：{}", label, e)))?;

    if output.status.success() {
        log::debug!("{} 执行成功", label);
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let detail = if stderr.is_empty() {
        match output.status.code() {
            Some(code) => format!("退出码 {}", code),
            None => "被信号终止".to_string(),
        }
    } else {
        stderr
    };
    log::warn!("{} 执行失败：{}", label, detail);
    Err(CoreError::CommandFailed(format!("{} 执行失败：{}", label, detail)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_macos_script_quotes_core_path() {
        let script = macos_grant_script(Path::new("/Applications/App.app/mihomo")).unwrap();
        assert_eq!(
            script,
            r#"do shell script "chown root:admin \"/Applications/App.app/mihomo\" && chmod +sx \"/Applications/App.app/mihomo\"" with administrator privileges"#
        );
    }

    #[test]
    fn test_linux_args_read_password_from_stdin() {
        let args = linux_grant_args(Path::new("/opt/app/mihomo")).unwrap();
        assert_eq!(args[0], "-S");
        assert!(args.contains(&"setcap".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/opt/app/mihomo"));
        assert!(args.contains(&CORE_CAPABILITIES.to_string()));
    }

    #[test]
    fn test_firewall_script_uses_core_stem_as_rule_name() {
        let script = firewall_script(&PathBuf::from("C:/App/sidecar/mihomo-alpha.exe")).unwrap();
        assert!(script.contains(r#"-DisplayName "mihomo-alpha""#));
        assert!(script.contains(r#"-Program "C:/App/sidecar/mihomo-alpha.exe""#));
        assert!(script.starts_with("Remove-NetFirewallRule"));
    }

    #[test]
    fn test_unsafe_paths_are_rejected() {
        assert!(script_safe_path(Path::new(r#"/tmp/evil"; rm -rf ~"#)).is_err());
        assert!(script_safe_path(Path::new("/tmp/`id`")).is_err());
        assert!(script_safe_path(Path::new("")).is_err());
    }

    #[test]
    fn test_grant_strategy_must_match_host() {
        assert!(check_grant_host(ElevationStrategy::DirectGrant, Platform::MacOs).is_ok());
        assert!(check_grant_host(ElevationStrategy::PasswordGrant, Platform::Linux).is_ok());

        for (strategy, host) in [
            (ElevationStrategy::DirectGrant, Platform::Linux),
            (ElevationStrategy::PasswordGrant, Platform::MacOs),
            (ElevationStrategy::PasswordGrant, Platform::Windows),
            (ElevationStrategy::FirewallReset, Platform::Windows),
        ] {
            assert!(matches!(
                check_grant_host(strategy, host),
                Err(CoreError::Unsupported(_))
            ));
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_mismatched_strategy_runs_no_command() {
        // 会话按 macOS 配置时，Linux 上不会去调用 osascript
        let result = grant_core_permission(
            Path::new("/opt/app/mihomo"),
            ElevationStrategy::DirectGrant,
            None,
        )
        .await;
        assert!(matches!(result, Err(CoreError::Unsupported(_))));
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_firewall_is_unsupported_off_windows() {
        let result = setup_firewall(Path::new("/opt/app/mihomo")).await;
        assert!(matches!(result, Err(CoreError::Unsupported(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_reports_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "read line; echo \"denied:$line\" >&2; exit 3"]);
        let result = run_command(command, Some("pw"), "sh").await;
        assert_eq!(
            result,
            Err(CoreError::CommandFailed("sh 执行失败：denied:pw".to_string()))
        );
    }
}
