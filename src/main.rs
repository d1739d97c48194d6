//! ctrstore CLI - inspect and edit image, layer and container stores

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use ctrstore::{
    Config, ContainerKind, Digest, Error, Image, ImageKind, LayerKind, Record, RepositoryImages,
};

#[derive(Parser)]
#[command(name = "ctrstore")]
#[command(about = "lock-protected metadata stores for images, layers and containers")]
#[command(version)]
struct Cli {
    /// storage configuration file
    #[arg(short, long, env = "CTRSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// storage root directory, overrides the configuration
    #[arg(long)]
    root: Option<PathBuf>,

    /// storage driver name, overrides the configuration
    #[arg(long)]
    driver: Option<String>,

    /// open stores read-only
    #[arg(long)]
    read_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// list images
    Images {
        /// print JSON
        #[arg(long)]
        json: bool,

        /// print IDs only
        #[arg(short, long)]
        quiet: bool,
    },

    /// show one image
    Image {
        /// image ID or name
        image: String,

        /// print JSON
        #[arg(long)]
        json: bool,
    },

    /// list images known under a digest
    ImagesByDigest {
        digest: String,

        #[arg(long)]
        json: bool,
    },

    /// list tags and digests of a repository
    ImagesByRepository {
        repository: String,

        #[arg(long)]
        json: bool,
    },

    /// create an image record
    CreateImage {
        /// ID of the image's top layer
        layer: String,

        /// image ID, generated if not given
        #[arg(long, default_value = "")]
        id: String,

        /// image name, may be repeated
        #[arg(short, long = "name")]
        names: Vec<String>,

        #[arg(short, long, default_value = "")]
        metadata: String,

        /// digest identifying the image, e.g. of its manifest
        #[arg(long)]
        digest: Option<String>,
    },

    /// replace the names of an image
    SetNames {
        image: String,

        /// new name, may be repeated; none clears all names
        #[arg(short, long = "name")]
        names: Vec<String>,
    },

    /// set the metadata of an image
    SetMetadata { image: String, metadata: String },

    /// print the metadata of an image
    Metadata { image: String },

    /// delete an image and its big data
    DeleteImage { image: String },

    /// delete every image
    WipeImages,

    /// store a big data item for an image
    SetBigData {
        image: String,
        key: String,

        /// read the data from this file instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// write a big data item of an image to stdout
    GetBigData { image: String, key: String },

    /// list the big data items of an image with their sizes
    ListBigData { image: String },

    /// set a flag on an image to a JSON value
    SetFlag {
        image: String,
        flag: String,
        value: String,
    },

    /// remove a flag from an image
    ClearFlag { image: String, flag: String },

    /// list layers
    Layers {
        #[arg(long)]
        json: bool,
    },

    /// create a layer record
    CreateLayer {
        #[arg(long, default_value = "")]
        id: String,

        /// parent layer ID or name
        #[arg(short, long)]
        parent: Option<String>,

        #[arg(short, long = "name")]
        names: Vec<String>,

        #[arg(short, long, default_value = "")]
        metadata: String,
    },

    /// delete a layer
    DeleteLayer { layer: String },

    /// list containers
    Containers {
        #[arg(long)]
        json: bool,
    },

    /// create a container record
    CreateContainer {
        /// image ID or name
        image: String,

        /// ID of the container's read-write layer
        layer: String,

        #[arg(long, default_value = "")]
        id: String,

        #[arg(short, long = "name")]
        names: Vec<String>,

        #[arg(short, long, default_value = "")]
        metadata: String,
    },

    /// delete a container
    DeleteContainer { container: String },
}

/// image as printed by the CLI, including the derived name data
#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ImageView<'a> {
    id: &'a str,
    names: &'a [String],
    layer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<&'a Digest>,
    digests: &'a [Digest],
    repositories: &'a [String],
    repo_tags: &'a [String],
    repo_digests: &'a [String],
    metadata: &'a str,
    big_data_names: &'a [String],
    flags: &'a BTreeMap<String, serde_json::Value>,
}

impl<'a> From<&'a Image> for ImageView<'a> {
    fn from(image: &'a Image) -> Self {
        Self {
            id: &image.id,
            names: &image.names,
            layer: image.top_layer(),
            digest: image.kind.digest.as_ref(),
            digests: image.digests(),
            repositories: image.repositories(),
            repo_tags: image.repo_tags(),
            repo_digests: image.repo_digests(),
            metadata: &image.metadata,
            big_data_names: &image.big_data_names,
            flags: &image.flags,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("CTRSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> ctrstore::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(driver) = &cli.driver {
        config.driver = driver.clone();
    }
    if cli.read_only {
        config.read_only = true;
    }
    Ok(config)
}

fn run(cli: Cli) -> ctrstore::Result<()> {
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Images { json, quiet } => {
            let mut store = config.open_store::<ImageKind>()?;
            let images = store.with_read_lock(|s| Ok(s.images()))?;

            if json {
                let views: Vec<ImageView> = images.iter().map(ImageView::from).collect();
                print_json(&views)?;
            } else {
                for image in &images {
                    if quiet {
                        println!("{}", image.id);
                    } else {
                        print_image(image);
                    }
                }
            }
        }

        Commands::Image { image, json } => {
            let mut store = config.open_store::<ImageKind>()?;
            let image = store.with_read_lock(|s| Ok(s.get(&image)?.clone()))?;

            if json {
                print_json(&ImageView::from(&image))?;
            } else {
                print_image(&image);
                for repository in image.repositories() {
                    println!("\trepository: {}", repository);
                }
                for repo_tag in image.repo_tags() {
                    println!("\ttag: {}", repo_tag);
                }
                for key in &image.big_data_names {
                    println!("\tdata: {}", key);
                }
                for (flag, value) in &image.flags {
                    println!("\tflag: {}={}", flag, value);
                }
            }
        }

        Commands::ImagesByDigest { digest, json } => {
            let digest = Digest::parse(&digest)?;
            let mut store = config.open_store::<ImageKind>()?;
            let images = store.with_read_lock(|s| Ok(s.by_digest(&digest)))?;

            if json {
                let views: Vec<ImageView> = images.iter().map(ImageView::from).collect();
                print_json(&views)?;
            } else {
                for image in &images {
                    print_image(image);
                }
            }
        }

        Commands::ImagesByRepository { repository, json } => {
            let mut store = config.open_store::<ImageKind>()?;
            let found: RepositoryImages =
                store.with_read_lock(|s| s.by_repository(&repository))?;

            if json {
                print_json(&found)?;
            } else {
                for (tag, id) in &found.tags {
                    println!("{}\ttag: {}", id, tag);
                }
                for (digest, id) in &found.digests {
                    println!("{}\tdigest: {}", id, digest);
                }
            }
        }

        Commands::CreateImage {
            layer,
            id,
            names,
            metadata,
            digest,
        } => {
            let mut kind = ImageKind::new(layer);
            if let Some(digest) = digest {
                kind = kind.with_digest(Digest::parse(&digest)?);
            }
            let mut store = config.open_store::<ImageKind>()?;
            let id = store.with_lock(|s| Ok(s.create(&id, &names, kind, &metadata)?.id.clone()))?;
            println!("{}", id);
        }

        Commands::SetNames { image, names } => {
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.set_names(&image, &names))?;
        }

        Commands::SetMetadata { image, metadata } => {
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.set_metadata(&image, &metadata))?;
        }

        Commands::Metadata { image } => {
            let mut store = config.open_store::<ImageKind>()?;
            let metadata = store.with_read_lock(|s| s.metadata(&image))?;
            println!("{}", metadata);
        }

        Commands::DeleteImage { image } => {
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.delete(&image))?;
            println!("deleted image {}", image);
        }

        Commands::WipeImages => {
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.wipe())?;
        }

        Commands::SetBigData { image, key, file } => {
            let data = match &file {
                Some(path) => std::fs::read(path).map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?,
                None => {
                    let mut data = vec![];
                    io::stdin()
                        .read_to_end(&mut data)
                        .map_err(|source| Error::Io {
                            path: "stdin".into(),
                            source,
                        })?;
                    data
                }
            };
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.set_big_data(&image, &key, &data))?;
        }

        Commands::GetBigData { image, key } => {
            let mut store = config.open_store::<ImageKind>()?;
            let data = store.with_read_lock(|s| s.big_data(&image, &key))?;
            io::stdout().write_all(&data).map_err(|source| Error::Io {
                path: "stdout".into(),
                source,
            })?;
        }

        Commands::ListBigData { image } => {
            let mut store = config.open_store::<ImageKind>()?;
            let items = store.with_read_lock(|s| {
                let mut items = vec![];
                for key in s.big_data_names(&image)? {
                    let size = s.big_data_size(&image, &key).ok();
                    items.push((key, size));
                }
                Ok(items)
            })?;

            for (key, size) in items {
                match size {
                    Some(size) => println!("{}\t{}", key, size),
                    None => println!("{}\t-", key),
                }
            }
        }

        Commands::SetFlag { image, flag, value } => {
            let value: serde_json::Value = serde_json::from_str(&value).map_err(Error::Encode)?;
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.set_flag(&image, &flag, value))?;
        }

        Commands::ClearFlag { image, flag } => {
            let mut store = config.open_store::<ImageKind>()?;
            store.with_lock(|s| s.clear_flag(&image, &flag))?;
        }

        Commands::Layers { json } => {
            let mut store = config.open_store::<LayerKind>()?;
            let layers = store.with_read_lock(|s| Ok(s.list()))?;

            if json {
                print_json(&layers)?;
            } else {
                for layer in &layers {
                    print_record(layer);
                    if let Some(parent) = layer.parent() {
                        println!("\tparent: {}", parent);
                    }
                }
            }
        }

        Commands::CreateLayer {
            id,
            parent,
            names,
            metadata,
        } => {
            let mut store = config.open_store::<LayerKind>()?;
            let id = store.with_lock(|s| {
                let parent = match parent {
                    Some(parent) => Some(s.lookup(&parent)?),
                    None => None,
                };
                Ok(s.create(&id, &names, LayerKind::new(parent), &metadata)?.id.clone())
            })?;
            println!("{}", id);
        }

        Commands::DeleteLayer { layer } => {
            let mut store = config.open_store::<LayerKind>()?;
            store.with_lock(|s| s.delete(&layer))?;
            println!("deleted layer {}", layer);
        }

        Commands::Containers { json } => {
            let mut store = config.open_store::<ContainerKind>()?;
            let containers = store.with_read_lock(|s| Ok(s.list()))?;

            if json {
                print_json(&containers)?;
            } else {
                for container in &containers {
                    print_record(container);
                    println!("\timage: {}", container.image());
                    println!("\tlayer: {}", container.layer());
                }
            }
        }

        Commands::CreateContainer {
            image,
            layer,
            id,
            names,
            metadata,
        } => {
            let mut images = config.open_store::<ImageKind>()?;
            let image = images.with_read_lock(|s| s.lookup(&image))?;

            let mut store = config.open_store::<ContainerKind>()?;
            let kind = ContainerKind::new(image, layer);
            let id = store.with_lock(|s| Ok(s.create(&id, &names, kind, &metadata)?.id.clone()))?;
            println!("{}", id);
        }

        Commands::DeleteContainer { container } => {
            let mut store = config.open_store::<ContainerKind>()?;
            store.with_lock(|s| s.delete(&container))?;
            println!("deleted container {}", container);
        }
    }

    Ok(())
}

fn print_record<K: ctrstore::Kind>(record: &Record<K>) {
    println!("{}", record.id);
    for name in &record.names {
        println!("\tname: {}", name);
    }
}

fn print_image(image: &Image) {
    print_record(image);
    println!("\tlayer: {}", image.top_layer());
    for digest in image.digests() {
        println!("\tdigest: {}", digest);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> ctrstore::Result<()> {
    let out = serde_json::to_string_pretty(value).map_err(Error::Encode)?;
    println!("{}", out);
    Ok(())
}
