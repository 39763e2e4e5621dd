//! Django `runserver` as the webapp under test

use std::path::PathBuf;

use crate::common::{Error, Result};

use super::process::ProcessSpec;

/// Where and how to run `manage.py runserver`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DjangoServer {
    /// Project root containing `manage.py`
    pub root: PathBuf,
    /// Host to bind; must match the host in the suite's URL
    pub host: String,
    /// Port to bind; must match the port in the suite's URL
    pub port: u16,
    /// Path requested to check the server came up
    pub startup_uri: String,
}

impl DjangoServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: "0.0.0.0".to_string(),
            port: 9877,
            startup_uri: "/".to_string(),
        }
    }

    /// `host:port` passed to runserver
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn startup_url(&self) -> String {
        format!("http://{}{}", self.bind(), self.startup_uri)
    }

    /// Process spec running the development server without the reloader
    pub fn process_spec(&self) -> Result<ProcessSpec> {
        if !self.root.join("manage.py").is_file() {
            return Err(Error::Config(format!(
                "Expected this to be the root dir containing manage.py: {}",
                self.root.display()
            )));
        }
        let bind = self.bind();
        Ok(
            ProcessSpec::new(["python", "manage.py", "runserver", bind.as_str(), "--noreload"])
                .current_dir(&self.root),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let django = DjangoServer::new("/srv/app");
        assert_eq!(django.bind(), "0.0.0.0:9877");
        assert_eq!(django.startup_url(), "http://0.0.0.0:9877/");
    }

    #[test]
    fn test_missing_manage_py() {
        let tmp = tempfile::tempdir().unwrap();
        let err = DjangoServer::new(tmp.path()).process_spec().unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("manage.py")));
    }

    #[test]
    fn test_process_spec() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("manage.py"), "").unwrap();
        let mut django = DjangoServer::new(tmp.path());
        django.host = "127.0.0.1".to_string();
        django.port = 8000;
        django.startup_uri = "/en-US/".to_string();

        let spec = django.process_spec().unwrap();
        assert_eq!(
            spec.command,
            vec!["python", "manage.py", "runserver", "127.0.0.1:8000", "--noreload"]
        );
        assert_eq!(spec.working_directory.as_deref(), Some(tmp.path()));
        assert_eq!(django.startup_url(), "http://127.0.0.1:8000/en-US/");
    }
}
