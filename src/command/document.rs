// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tabled::{builder::Builder, settings::Style, Table};

use crate::{documents, error::Result};

use super::Context;

/// Work with documents on behalf of the signed-in user.
#[derive(Debug, Parser)]
pub(crate) struct Command {
    #[clap(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// List the documents visible to you.
    List,
    /// Show the details of one document.
    Show {
        /// The numerical ID of the document.
        id: u64,
    },
    /// Upload a file as a new document.
    Upload {
        /// The file to upload.
        #[arg(value_hint = clap::ValueHint::FilePath)]
        path: PathBuf,
        /// A title for the document.
        #[arg(long)]
        title: Option<String>,
        /// The kind of document, such as "circular" or "report".
        #[arg(long = "type")]
        document_type: Option<String>,
        /// The department the document belongs to.
        #[arg(long)]
        department: Option<String>,
    },
    /// Ask the server to summarize a document.
    Summarize {
        /// The numerical ID of the document.
        id: u64,
    },
}

fn print_details(document: &documents::Document) {
    let fields = [
        ("ID", document.id.to_string()),
        ("Title", document.title.clone().unwrap_or_default()),
        ("File", document.original_filename.clone()),
        ("Stored as", document.filename.clone()),
        ("MIME type", document.mime_type.clone()),
        ("Size", document.file_size.to_string()),
        ("Type", document.document_type.clone().unwrap_or_default()),
        ("Department", document.department.clone().unwrap_or_default()),
        ("Priority", document.priority.clone().unwrap_or_default()),
        ("Language", document.language.clone()),
        ("Status", document.processing_status.clone()),
        ("Uploaded by", document.uploaded_by.to_string()),
        ("Uploaded", document.created_at.clone()),
    ];
    let mut builder = Builder::default();
    for (name, value) in fields {
        builder.push_record([name.to_owned(), value]);
    }
    println!("{}", builder.build().with(Style::rounded()));
}

#[async_trait]
impl super::Command for Command {
    async fn execute(self, ctx: &Context) -> Result<()> {
        let client = &ctx.documents;
        match self.action {
            Action::List => {
                let documents = ctx
                    .manager
                    .authorized(|token| async move { client.list(&token).await })
                    .await?;
                if documents.is_empty() {
                    println!("No documents");
                } else {
                    println!("{}", Table::new(documents).with(Style::rounded()));
                }
            }
            Action::Show { id } => {
                let document = ctx
                    .manager
                    .authorized(|token| async move { client.show(&token, id).await })
                    .await?;
                print_details(&document);
            }
            Action::Upload {
                path,
                title,
                document_type,
                department,
            } => {
                let upload = documents::Upload {
                    path,
                    title,
                    document_type,
                    department,
                };
                let document = ctx
                    .manager
                    .authorized(|token| async move { client.upload(&token, upload).await })
                    .await?;
                println!("Uploaded document {}", document.id);
                print_details(&document);
            }
            Action::Summarize { id } => {
                let summary = ctx
                    .manager
                    .authorized(|token| async move { client.summarize(&token, id).await })
                    .await?;
                let confidence = summary
                    .confidence_score
                    .map_or_else(String::new, |score| format!(", confidence {score:.2}"));
                println!(
                    "Summary {} of document {} ({}, {}{}), created {}",
                    summary.id,
                    summary.document_id,
                    summary.summary_type,
                    summary.language,
                    confidence,
                    summary.created_at
                );
                println!();
                println!("{}", summary.summary_text);
            }
        }
        Ok(())
    }
}
