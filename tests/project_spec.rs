mod common;

use std::fs;

use devstack::models::*;
use speculate2::speculate;

speculate! {
    before {
        let dir = common::project_dir();
        let paths = common::paths(&dir);
        let file = paths.descriptor_file();
    }

    describe "project descriptor" {
        describe "load_or_init" {
            it "writes a default descriptor when none exists" {
                let project = ProjectDescriptor::load_or_init(&file).expect("Failed to init");

                assert!(file.is_file());
                assert!(project.runs_backend());
                assert!(project.runs_frontend());
                assert_eq!(project.network, Network::Local);
                assert!(project.updated_at.is_some());
            }

            it "loads an existing descriptor unchanged" {
                fs::write(&file, r#"{ "network": "testnet", "run": ["frontend"] }"#).unwrap();
                let project = ProjectDescriptor::load_or_init(&file).expect("Failed to load");

                assert_eq!(project.network, Network::Testnet);
                assert!(!project.runs_backend());
                assert_eq!(project.backend_dir, "backend");
                assert_eq!(project.frontend.command, vec!["npm", "run", "dev"]);
            }

            it "rejects a malformed descriptor" {
                fs::write(&file, "{ not json").unwrap();
                assert!(ProjectDescriptor::load_or_init(&file).is_err());
            }
        }

        describe "load_or_default" {
            it "uses defaults without creating a descriptor" {
                let project = ProjectDescriptor::load_or_default(&file).expect("Failed to load");

                assert_eq!(project, ProjectDescriptor::default());
                assert!(!file.exists());
            }

            it "reads an existing descriptor" {
                fs::write(&file, r#"{ "network": "mainnet" }"#).unwrap();
                let project = ProjectDescriptor::load_or_default(&file).expect("Failed to load");

                assert_eq!(project.network, Network::Mainnet);
            }
        }

        describe "edits" {
            it "toggles run targets and reports the new state" {
                let mut project = ProjectDescriptor::default();

                assert!(!project.toggle_run(RunTarget::Backend));
                assert!(!project.runs_backend());
                assert!(project.toggle_run(RunTarget::Backend));
                assert!(project.runs_backend());
            }

            it "survives a save and reload" {
                let mut project = ProjectDescriptor::default();
                project.set_network(Network::Mainnet);
                project.set_sync_protocol(true);
                project.set_advanced_engine(true);
                project.set_engine_param("batch_size", Some(serde_json::json!(64)));
                project.save(&file).expect("Failed to save");

                let loaded = ProjectDescriptor::load(&file).expect("Failed to load");
                assert_eq!(loaded, project);
                assert_eq!(loaded.engine["batch_size"], serde_json::json!(64));
            }

            it "clears engine parameters" {
                let mut project = ProjectDescriptor::default();
                project.set_engine_param("batch_size", Some(serde_json::json!(64)));
                project.set_engine_param("batch_size", None);
                assert!(project.engine.is_empty());
            }
        }

        describe "contracts" {
            it "resolves nothing when unconfigured" {
                let project = ProjectDescriptor::default();
                assert_eq!(project.resolve_contracts(paths.project_dir()), Ok(None));
            }

            it "resolves paths under the backend directory" {
                let project = ProjectDescriptor {
                    contracts: Some(ContractsConfig {
                        language: "Solidity".to_string(),
                        dir: "contracts".to_string(),
                    }),
                    ..Default::default()
                };
                let contracts = project
                    .resolve_contracts(paths.project_dir())
                    .expect("language should be supported")
                    .expect("contracts configured");

                assert_eq!(contracts.language, ContractsLanguage::Solidity);
                assert_eq!(contracts.dir, paths.project_dir().join("backend/contracts"));
                assert_eq!(contracts.artifacts_dir(), paths.project_dir().join("backend/artifacts"));
            }

            it "reports the unsupported language" {
                let project = ProjectDescriptor {
                    contracts: Some(ContractsConfig {
                        language: "vyper".to_string(),
                        dir: "contracts".to_string(),
                    }),
                    ..Default::default()
                };
                assert_eq!(
                    project.resolve_contracts(paths.project_dir()),
                    Err("vyper".to_string())
                );
            }
        }
    }

    describe "plugin registry" {
        it "keeps insertion order across serialization" {
            let mut registry = PluginRegistry::new();
            registry.insert(PluginEntry::handler("zeta", "backend/zeta.js"));
            registry.insert(PluginEntry::provider("alpha", "backend/alpha.js", Some(HydrationBackend::Redis)));

            let json = serde_json::to_string(&registry).unwrap();
            let back: PluginRegistry = serde_json::from_str(&json).unwrap();
            let names: Vec<_> = back.iter().map(|e| e.name.as_str()).collect();
            assert_eq!(names, vec!["zeta", "alpha"]);
        }

        it "writes the category as a kind tag" {
            let entry = PluginEntry::provider("prices", "backend/prices.js", Some(HydrationBackend::Postgres));
            let value = serde_json::to_value(&entry).unwrap();

            assert_eq!(value["kind"], "provider");
            assert_eq!(value["hydration"], "postgres");
        }

        it "replaces an existing name in place" {
            let mut registry = PluginRegistry::new();
            registry.insert(PluginEntry::handler("a", "backend/a.js"));
            registry.insert(PluginEntry::handler("b", "backend/b.js"));
            registry.insert(PluginEntry::handler("a", "backend/a2.js"));

            let entries: Vec<_> = registry.iter().map(|e| (e.name.as_str(), e.path.as_str())).collect();
            assert_eq!(entries, vec![("a", "backend/a2.js"), ("b", "backend/b.js")]);
            assert!(registry.remove("a").is_some());
            assert_eq!(registry.len(), 1);
        }
    }
}
