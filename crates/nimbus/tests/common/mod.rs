use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub const TEST_PUBLIC_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIJtest nimbus@test";

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    /// Empty project directory holding a throwaway SSH public key
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("id_test.pub"), format!("{}\n", TEST_PUBLIC_KEY)).unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("nimbus.kdl"), content).unwrap();
    }

    /// Project "demo" with one security rule and the test key
    pub fn write_default_config(&self) {
        self.write_config(&format!(
            r#"
project "demo"
region "westeurope"

vm {{
    size "Standard_B1s"
    ssh-public-key "{}"
}}

security-rule "allow-ssh" {{
    priority 1000
    port 22
}}
"#,
            self.key_path().display()
        ));
    }

    #[allow(dead_code)]
    pub fn write_state(&self, content: &str) {
        let dir = self.root.path().join(".nimbus");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("state.json"), content).unwrap();
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.path().join("id_test.pub")
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}
