mod error;
mod scripts;

pub use error::Error;

/// Kv is the KV/scripting facility named in the job bus's contract (C1):
/// ephemeral counters and sets, mutated only through the two mandatory
/// server-side atomic scripts (§5, §9). No method here does a plain
/// GET-then-SET of a counter — every compound update goes through
/// [`scripts::BATCH_THRESHOLD_SWAP`] or
/// [`scripts::EVIDENCE_COUNTER_CHECK_AND_FETCH`].
pub struct Kv {
    conn: redis::aio::ConnectionManager,
    batch_threshold_swap: redis::Script,
    evidence_counter_check_and_fetch: redis::Script,
}

impl Kv {
    pub async fn connect(redis_url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;

        Ok(Self {
            conn,
            batch_threshold_swap: redis::Script::new(scripts::BATCH_THRESHOLD_SWAP),
            evidence_counter_check_and_fetch: redis::Script::new(
                scripts::EVIDENCE_COUNTER_CHECK_AND_FETCH,
            ),
        })
    }

    /// Pushes `entry` (serialized as JSON) onto the batcher's pending list
    /// and adds `tokens` to its running total. Returns the flushed batch
    /// (deserialized) if this call crossed `max_batch_tokens`, else `None`.
    #[tracing::instrument(skip(self, entry))]
    pub async fn batch_threshold_swap<T: serde::Serialize + serde::de::DeserializeOwned>(
        &mut self,
        list_key: &str,
        total_key: &str,
        entry: &T,
        tokens: u32,
        max_batch_tokens: u32,
    ) -> Result<Option<Vec<T>>, Error> {
        let encoded = serde_json::to_string(entry)?;

        let raw: redis::Value = self
            .batch_threshold_swap
            .key(list_key)
            .key(total_key)
            .arg(encoded)
            .arg(tokens)
            .arg(max_batch_tokens)
            .invoke_async(&mut self.conn)
            .await?;

        match raw {
            redis::Value::Nil | redis::Value::Boolean(false) => Ok(None),
            redis::Value::Array(items) => {
                let mut batch = Vec::with_capacity(items.len());
                for item in items {
                    let redis::Value::BulkString(bytes) = item else {
                        return Err(Error::Redis(redis::RedisError::from((
                            redis::ErrorKind::TypeError,
                            "expected bulk string entries in batch",
                        ))));
                    };
                    batch.push(serde_json::from_slice(&bytes)?);
                }
                Ok(Some(batch))
            }
            other => Err(Error::Redis(redis::RedisError::from((
                redis::ErrorKind::TypeError,
                "unexpected script reply shape",
                format!("{other:?}"),
            )))),
        }
    }

    /// Increments the evidence counter for `(run_id, fingerprint)` and
    /// reports whether this call was the one that reached `expected_count`.
    #[tracing::instrument(skip(self))]
    pub async fn evidence_counter_check_and_fetch(
        &mut self,
        run_id: uuid::Uuid,
        fingerprint: kg_ids::Fingerprint,
        expected_count: u32,
    ) -> Result<bool, Error> {
        let key = format!("evidence:{run_id}:{fingerprint}");

        let reached: i64 = self
            .evidence_counter_check_and_fetch
            .key(key)
            .arg(expected_count)
            .invoke_async(&mut self.conn)
            .await?;

        Ok(reached == 1)
    }

    /// Adds `job_id` to the expected-set for `directory_path`'s aggregation
    /// (C7) and reports the pair `(completed, expected)` set sizes after the
    /// call, so the caller can decide whether to enqueue
    /// `analyze-directory` once the two sets are equal.
    pub async fn directory_aggregation_mark_expected(
        &mut self,
        run_id: uuid::Uuid,
        directory_path: &str,
        job_id: &str,
    ) -> Result<(), Error> {
        let key = format!("dir-expected:{run_id}:{directory_path}");
        redis::cmd("SADD")
            .arg(&key)
            .arg(job_id)
            .query_async::<()>(&mut self.conn)
            .await?;
        Ok(())
    }

    pub async fn directory_aggregation_mark_complete(
        &mut self,
        run_id: uuid::Uuid,
        directory_path: &str,
        job_id: &str,
    ) -> Result<(bool, usize, usize), Error> {
        let expected_key = format!("dir-expected:{run_id}:{directory_path}");
        let completed_key = format!("dir-completed:{run_id}:{directory_path}");

        redis::cmd("SADD")
            .arg(&completed_key)
            .arg(job_id)
            .query_async::<()>(&mut self.conn)
            .await?;

        let expected: usize = redis::cmd("SCARD")
            .arg(&expected_key)
            .query_async(&mut self.conn)
            .await?;
        let completed: usize = redis::cmd("SCARD")
            .arg(&completed_key)
            .query_async(&mut self.conn)
            .await?;

        Ok((expected > 0 && expected == completed, completed, expected))
    }
}
