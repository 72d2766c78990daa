use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Runs one store call under `deadline`. A timeout is reported like any
/// other store failure so callers fail closed.
pub async fn within_deadline<T, E, F>(deadline: Duration, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("store call exceeded deadline of {:?}", deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_results() {
        let ok = within_deadline(Duration::from_secs(1), async { Ok::<_, String>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err =
            within_deadline(Duration::from_secs(1), async { Err::<u8, _>("boom".to_string()) })
                .await;
        assert_eq!(err, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, String>(())
        };

        let result = within_deadline(Duration::from_millis(50), slow).await;
        assert!(result.unwrap_err().contains("deadline"));
    }
}
