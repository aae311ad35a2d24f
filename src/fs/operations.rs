use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Checks whether the file is empty or its last byte is a line break, i.e. whether a new line can
/// be appended without gluing it to a partially written one. Leaves the cursor at the end of the
/// file.
pub async fn ends_with_line_break(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
) -> Result<bool, io::Error> {
    let len = file.seek(std::io::SeekFrom::End(0)).await?;
    if len == 0 {
        return Ok(true);
    }
    file.seek(std::io::SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;

    use tempfile::tempfile;
    use tokio::io::AsyncSeekExt;

    use crate::fs::operations::ends_with_line_break;

    async fn check(content: &str) -> Result<(bool, u64)> {
        let mut file = tempfile()?;
        file.write_all(content.as_bytes())?;
        let mut file = tokio::fs::File::from_std(file);
        file.rewind().await?;
        let result = ends_with_line_break(&mut file).await?;
        Ok((result, file.stream_position().await?))
    }

    #[tokio::test]
    async fn test_empty_file() -> Result<()> {
        assert_eq!(check("").await?, (true, 0));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_line() -> Result<()> {
        let content = "header\nfirst,line\n";
        assert_eq!(check(content).await?, (true, content.len() as u64));
        Ok(())
    }

    #[tokio::test]
    async fn test_interrupted_line() -> Result<()> {
        let content = "header\nfirst,line\nsecond,li";
        assert_eq!(check(content).await?, (false, content.len() as u64));
        Ok(())
    }
}
