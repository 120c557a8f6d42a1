//! 줄 단위 텍스트 파일 조회
//!
//! 무시 목록과 차단 목록은 한 줄에 한 항목인 평문 파일입니다.
//! 빈 줄과 주석 접두사로 시작하는 줄은 건너뛰고,
//! 앞뒤 공백을 제거한 뒤 정확히 일치하는지 비교합니다.
//! 쓰기는 항상 append이며, 파일이 없을 때만 지정한 권한으로 생성합니다.

use std::io;
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// 한 줄이 비교 대상인지 확인하고, 대상이면 정규화된 값을 반환합니다.
fn entry_of<'a>(line: &'a str, comment_marker: &str) -> Option<&'a str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(comment_marker) {
        return None;
    }
    Some(trimmed)
}

/// 파일에 `needle`과 일치하는 항목이 있는지 확인합니다.
///
/// 파일이 없으면 `NotFound` 에러를 그대로 반환하므로,
/// 없는 파일을 "항목 없음"으로 볼지는 호출자가 결정합니다.
pub async fn file_contains_line(
    path: &Path,
    needle: &str,
    comment_marker: &str,
) -> io::Result<bool> {
    let needle = needle.trim();
    if needle.is_empty() {
        return Ok(false);
    }
    file_contains_entry(path, comment_marker, |entry| entry == needle).await
}

/// 파일에 `matches`를 만족하는 항목이 있는지 확인합니다.
///
/// 파일을 줄 단위로 스트리밍하며 첫 일치에서 멈춥니다.
/// UTF-8이 아닌 바이트는 대체 문자로 바꿔 비교하므로, 운영자가 남긴
/// Latin-1 주석 한 줄 때문에 조회 전체가 실패하지 않습니다.
pub async fn file_contains_entry<F>(
    path: &Path,
    comment_marker: &str,
    matches: F,
) -> io::Result<bool>
where
    F: Fn(&str) -> bool,
{
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(false);
        }
        let line = String::from_utf8_lossy(&buf);
        if entry_of(&line, comment_marker).is_some_and(&matches) {
            return Ok(true);
        }
    }
}

/// 한 줄을 파일 끝에 추가하고 디스크에 동기화합니다.
///
/// 앞뒤 공백을 제거한 뒤 개행 하나를 붙여 기록합니다.
/// `mode`는 파일을 새로 만들 때만 적용됩니다 (unix).
pub async fn append_line(path: &Path, line: &str, mode: u32) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.append(true).create(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path).await?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line.trim());
    buf.push('\n');
    file.write_all(buf.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}
