//! 进程内的键值状态存储
//!
//! 每个键对应状态目录下的一个 JSON 文件。所有修改都是
//! "整体读取 → 修改 → 整体写回"，由一把异步锁串行化。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StoreError;

#[derive(Clone)]
pub struct StateStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl StateStore {
    /// 打开状态目录，不存在则创建
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|source| StoreError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// 读取整个值，文件不存在时返回默认值
    pub async fn load<T>(&self, key: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let _guard = self.lock.lock().await;
        self.read_unlocked(key).await
    }

    /// 整体写回
    pub async fn save<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let _guard = self.lock.lock().await;
        self.write_unlocked(key, value).await
    }

    /// 读-改-写，整个过程持有锁
    pub async fn update<T, R, F>(&self, key: &str, mutate: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.lock.lock().await;
        let mut value: T = self.read_unlocked(key).await?;
        let result = mutate(&mut value);
        self.write_unlocked(key, &value).await?;
        Ok(result)
    }

    async fn read_unlocked<T>(&self, key: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    async fn write_unlocked<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;

        // 先写临时文件再改名，避免写到一半留下损坏的状态
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|source| StoreError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &path).await.map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("状态已保存: {}", path.display());
        Ok(())
    }
}
