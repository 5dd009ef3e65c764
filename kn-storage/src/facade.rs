//! Async storage façade (§4.2, §5).
//!
//! The engine itself is a thin wrapper around a `SqlitePool` and is safe to
//! call directly from any async context. The façade exists for callers
//! that want the single-writer-task shape instead: every request travels
//! down one `mpsc` channel to a dedicated worker task that owns the engine
//! and the LRU caches, and the result comes back on a `oneshot` channel
//! tagged with the same opaque correlation token the caller handed in.
//! Cross-cutting notifications (a note moving notebooks, a tag list
//! changing) fan out on a `broadcast` channel instead of riding the
//! request/response pair, since more than one subscriber may care.

use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use kn_domain::entities::{LinkedNotebook, Note, Notebook, Resource, SavedSearch, SharedNotebook, Tag, User};
use kn_domain::filters::{ListOptions, NameSortColumn, NoteFilter, NoteSortColumn};
use kn_domain::ids::{Guid, LocalId};
use kn_domain::DomainError;

use crate::cache::EntityCache;
use crate::config::StorageConfig;
use crate::engine::LocalStorageEngine;
use crate::errors::StorageError;
use crate::{linked_notebooks, notebooks, notes, resources, searches, shared_notebooks, tags, users};

/// Correlation token threaded through a request/response pair. Opaque to
/// the façade itself; callers mint one however they like (it need not be a
/// UUID, but that is the simplest choice and matches the rest of the
/// identifier scheme).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken(pub Uuid);

impl CorrelationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

pub type FacadeResult<T> = Result<T, DomainError>;

/// Which of the four favoritable entity kinds an `Entity*` event concerns
/// (§4.7: the favorites model subscribes across all of them uniformly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoritableKind {
    Notebook,
    Tag,
    Note,
    SavedSearch,
}

#[derive(Debug, Clone)]
pub enum Event {
    NoteMovedToAnotherNotebook {
        note_local_id: LocalId,
        previous_notebook_local_id: LocalId,
        new_notebook_local_id: LocalId,
    },
    NoteTagListChanged {
        note_local_id: LocalId,
        previous_tag_local_ids: Vec<LocalId>,
        new_tag_local_ids: Vec<LocalId>,
    },
    ExpungeNotelessTagsFromLinkedNotebooksComplete {
        token: CorrelationToken,
    },
    EntityCreated {
        kind: FavoritableKind,
        local_id: LocalId,
    },
    EntityUpdated {
        kind: FavoritableKind,
        local_id: LocalId,
    },
    EntityExpunged {
        kind: FavoritableKind,
        local_id: LocalId,
    },
}

enum Command {
    CreateNotebook {
        notebook: Notebook,
        reply: oneshot::Sender<FacadeResult<Notebook>>,
    },
    UpdateNotebook {
        notebook: Notebook,
        reply: oneshot::Sender<FacadeResult<Notebook>>,
    },
    FindNotebook {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Option<Notebook>>>,
    },
    ListNotebooks {
        options: ListOptions<NameSortColumn>,
        reply: oneshot::Sender<FacadeResult<Vec<Notebook>>>,
    },
    ExpungeNotebook {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    GetNotebookCount {
        reply: oneshot::Sender<FacadeResult<u32>>,
    },
    ListAllSharedNotebooks {
        reply: oneshot::Sender<FacadeResult<Vec<SharedNotebook>>>,
    },
    CreateTag {
        tag: Tag,
        reply: oneshot::Sender<FacadeResult<Tag>>,
    },
    UpdateTag {
        tag: Tag,
        reply: oneshot::Sender<FacadeResult<Tag>>,
    },
    FindTag {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Option<Tag>>>,
    },
    ListTags {
        options: ListOptions<NameSortColumn>,
        reply: oneshot::Sender<FacadeResult<Vec<Tag>>>,
    },
    DeleteTag {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    RestoreTag {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    ExpungeTag {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    GetTagCount {
        reply: oneshot::Sender<FacadeResult<u32>>,
    },
    CreateNote {
        note: Note,
        reply: oneshot::Sender<FacadeResult<Note>>,
    },
    UpdateNote {
        note: Note,
        reply: oneshot::Sender<FacadeResult<Note>>,
    },
    FindNote {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Option<Note>>>,
    },
    ListNotes {
        filter: NoteFilter,
        options: ListOptions<NoteSortColumn>,
        reply: oneshot::Sender<FacadeResult<Vec<Note>>>,
    },
    DeleteNote {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    RestoreNote {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    ExpungeNote {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    GetNoteCount {
        filter: NoteFilter,
        reply: oneshot::Sender<FacadeResult<u32>>,
    },
    MoveNoteToNotebook {
        note_local_id: LocalId,
        new_notebook_local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    LinkTagWithNote {
        note_local_id: LocalId,
        tag_local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Vec<LocalId>>>,
    },
    UnlinkTagWithNote {
        note_local_id: LocalId,
        tag_local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Vec<LocalId>>>,
    },
    CreateResource {
        resource: Resource,
        reply: oneshot::Sender<FacadeResult<Resource>>,
    },
    UpdateResource {
        resource: Resource,
        reply: oneshot::Sender<FacadeResult<Resource>>,
    },
    FindResource {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Option<Resource>>>,
    },
    ExpungeResource {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    CreateSavedSearch {
        search: SavedSearch,
        reply: oneshot::Sender<FacadeResult<SavedSearch>>,
    },
    UpdateSavedSearch {
        search: SavedSearch,
        reply: oneshot::Sender<FacadeResult<SavedSearch>>,
    },
    FindSavedSearch {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<Option<SavedSearch>>>,
    },
    ListSavedSearches {
        options: ListOptions<NameSortColumn>,
        reply: oneshot::Sender<FacadeResult<Vec<SavedSearch>>>,
    },
    ExpungeSavedSearch {
        local_id: LocalId,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    GetSavedSearchCount {
        reply: oneshot::Sender<FacadeResult<u32>>,
    },
    CreateUser {
        user: User,
        reply: oneshot::Sender<FacadeResult<User>>,
    },
    UpdateUser {
        user: User,
        reply: oneshot::Sender<FacadeResult<User>>,
    },
    FindCurrentUser {
        reply: oneshot::Sender<FacadeResult<Option<User>>>,
    },
    CreateLinkedNotebook {
        linked_notebook: LinkedNotebook,
        reply: oneshot::Sender<FacadeResult<LinkedNotebook>>,
    },
    UpdateLinkedNotebook {
        linked_notebook: LinkedNotebook,
        reply: oneshot::Sender<FacadeResult<LinkedNotebook>>,
    },
    FindLinkedNotebook {
        guid: Guid,
        reply: oneshot::Sender<FacadeResult<Option<LinkedNotebook>>>,
    },
    ListLinkedNotebooks {
        reply: oneshot::Sender<FacadeResult<Vec<LinkedNotebook>>>,
    },
    ExpungeLinkedNotebook {
        guid: Guid,
        reply: oneshot::Sender<FacadeResult<()>>,
    },
    ExpungeNotelessTagsFromLinkedNotebooks {
        token: CorrelationToken,
        reply: oneshot::Sender<FacadeResult<u32>>,
    },
}

/// Handle held by callers. Cheap to clone; every clone shares the same
/// worker task and event stream.
#[derive(Clone)]
pub struct StorageFacade {
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<Event>,
}

impl StorageFacade {
    pub async fn connect(config: &StorageConfig) -> Result<Self, StorageError> {
        let engine = LocalStorageEngine::connect(config).await?;
        let (command_tx, command_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);

        let worker = Worker {
            engine,
            notebook_cache: EntityCache::new(config.notebook_cache_capacity),
            tag_cache: EntityCache::new(config.tag_cache_capacity),
            event_tx: event_tx.clone(),
        };
        tokio::spawn(worker.run(command_rx));

        Ok(Self { command_tx, event_tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<FacadeResult<T>>) -> Command) -> FacadeResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let command = build(reply_tx);
        self.command_tx
            .send(command)
            .await
            .map_err(|_| DomainError::Internal("storage worker task is gone".to_string()))?;
        reply_rx
            .await
            .map_err(|_| DomainError::Internal("storage worker dropped the reply channel".to_string()))?
    }

    // --- Notebook -----------------------------------------------------

    pub async fn create_notebook(&self, notebook: Notebook) -> FacadeResult<Notebook> {
        self.call(|reply| Command::CreateNotebook { notebook, reply }).await
    }

    pub async fn update_notebook(&self, notebook: Notebook) -> FacadeResult<Notebook> {
        self.call(|reply| Command::UpdateNotebook { notebook, reply }).await
    }

    pub async fn find_notebook(&self, local_id: LocalId) -> FacadeResult<Option<Notebook>> {
        self.call(|reply| Command::FindNotebook { local_id, reply }).await
    }

    pub async fn list_notebooks(&self, options: ListOptions<NameSortColumn>) -> FacadeResult<Vec<Notebook>> {
        self.call(|reply| Command::ListNotebooks { options, reply }).await
    }

    pub async fn expunge_notebook(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::ExpungeNotebook { local_id, reply }).await
    }

    pub async fn get_notebook_count(&self) -> FacadeResult<u32> {
        self.call(|reply| Command::GetNotebookCount { reply }).await
    }

    pub async fn list_all_shared_notebooks(&self) -> FacadeResult<Vec<SharedNotebook>> {
        self.call(|reply| Command::ListAllSharedNotebooks { reply }).await
    }

    // --- Tag ------------------------------------------------------------

    pub async fn create_tag(&self, tag: Tag) -> FacadeResult<Tag> {
        self.call(|reply| Command::CreateTag { tag, reply }).await
    }

    pub async fn update_tag(&self, tag: Tag) -> FacadeResult<Tag> {
        self.call(|reply| Command::UpdateTag { tag, reply }).await
    }

    pub async fn find_tag(&self, local_id: LocalId) -> FacadeResult<Option<Tag>> {
        self.call(|reply| Command::FindTag { local_id, reply }).await
    }

    pub async fn list_tags(&self, options: ListOptions<NameSortColumn>) -> FacadeResult<Vec<Tag>> {
        self.call(|reply| Command::ListTags { options, reply }).await
    }

    pub async fn delete_tag(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::DeleteTag { local_id, reply }).await
    }

    pub async fn restore_tag(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::RestoreTag { local_id, reply }).await
    }

    pub async fn expunge_tag(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::ExpungeTag { local_id, reply }).await
    }

    pub async fn get_tag_count(&self) -> FacadeResult<u32> {
        self.call(|reply| Command::GetTagCount { reply }).await
    }

    // --- Note -----------------------------------------------------------

    pub async fn create_note(&self, note: Note) -> FacadeResult<Note> {
        self.call(|reply| Command::CreateNote { note, reply }).await
    }

    pub async fn update_note(&self, note: Note) -> FacadeResult<Note> {
        self.call(|reply| Command::UpdateNote { note, reply }).await
    }

    pub async fn find_note(&self, local_id: LocalId) -> FacadeResult<Option<Note>> {
        self.call(|reply| Command::FindNote { local_id, reply }).await
    }

    pub async fn list_notes(
        &self,
        filter: NoteFilter,
        options: ListOptions<NoteSortColumn>,
    ) -> FacadeResult<Vec<Note>> {
        self.call(|reply| Command::ListNotes { filter, options, reply }).await
    }

    pub async fn delete_note(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::DeleteNote { local_id, reply }).await
    }

    pub async fn restore_note(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::RestoreNote { local_id, reply }).await
    }

    pub async fn expunge_note(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::ExpungeNote { local_id, reply }).await
    }

    pub async fn get_note_count(&self, filter: NoteFilter) -> FacadeResult<u32> {
        self.call(|reply| Command::GetNoteCount { filter, reply }).await
    }

    pub async fn move_note_to_notebook(
        &self,
        note_local_id: LocalId,
        new_notebook_local_id: LocalId,
    ) -> FacadeResult<()> {
        self.call(|reply| Command::MoveNoteToNotebook {
            note_local_id,
            new_notebook_local_id,
            reply,
        })
        .await
    }

    /// Appends `tag_local_id` to a note's tag list, raising
    /// `noteTagListChanged` on success (§4.2).
    pub async fn link_tag_with_note(&self, note_local_id: LocalId, tag_local_id: LocalId) -> FacadeResult<Vec<LocalId>> {
        self.call(|reply| Command::LinkTagWithNote { note_local_id, tag_local_id, reply }).await
    }

    pub async fn unlink_tag_with_note(
        &self,
        note_local_id: LocalId,
        tag_local_id: LocalId,
    ) -> FacadeResult<Vec<LocalId>> {
        self.call(|reply| Command::UnlinkTagWithNote { note_local_id, tag_local_id, reply }).await
    }

    // --- Resource ---------------------------------------------------------

    pub async fn create_resource(&self, resource: Resource) -> FacadeResult<Resource> {
        self.call(|reply| Command::CreateResource { resource, reply }).await
    }

    pub async fn update_resource(&self, resource: Resource) -> FacadeResult<Resource> {
        self.call(|reply| Command::UpdateResource { resource, reply }).await
    }

    pub async fn find_resource(&self, local_id: LocalId) -> FacadeResult<Option<Resource>> {
        self.call(|reply| Command::FindResource { local_id, reply }).await
    }

    pub async fn expunge_resource(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::ExpungeResource { local_id, reply }).await
    }

    // --- SavedSearch --------------------------------------------------------

    pub async fn create_saved_search(&self, search: SavedSearch) -> FacadeResult<SavedSearch> {
        self.call(|reply| Command::CreateSavedSearch { search, reply }).await
    }

    pub async fn update_saved_search(&self, search: SavedSearch) -> FacadeResult<SavedSearch> {
        self.call(|reply| Command::UpdateSavedSearch { search, reply }).await
    }

    pub async fn find_saved_search(&self, local_id: LocalId) -> FacadeResult<Option<SavedSearch>> {
        self.call(|reply| Command::FindSavedSearch { local_id, reply }).await
    }

    pub async fn list_saved_searches(&self, options: ListOptions<NameSortColumn>) -> FacadeResult<Vec<SavedSearch>> {
        self.call(|reply| Command::ListSavedSearches { options, reply }).await
    }

    pub async fn expunge_saved_search(&self, local_id: LocalId) -> FacadeResult<()> {
        self.call(|reply| Command::ExpungeSavedSearch { local_id, reply }).await
    }

    pub async fn get_saved_search_count(&self) -> FacadeResult<u32> {
        self.call(|reply| Command::GetSavedSearchCount { reply }).await
    }

    // --- User -----------------------------------------------------------

    pub async fn create_user(&self, user: User) -> FacadeResult<User> {
        self.call(|reply| Command::CreateUser { user, reply }).await
    }

    pub async fn update_user(&self, user: User) -> FacadeResult<User> {
        self.call(|reply| Command::UpdateUser { user, reply }).await
    }

    pub async fn find_current_user(&self) -> FacadeResult<Option<User>> {
        self.call(|reply| Command::FindCurrentUser { reply }).await
    }

    // --- LinkedNotebook -----------------------------------------------------

    pub async fn create_linked_notebook(&self, linked_notebook: LinkedNotebook) -> FacadeResult<LinkedNotebook> {
        self.call(|reply| Command::CreateLinkedNotebook { linked_notebook, reply }).await
    }

    pub async fn update_linked_notebook(&self, linked_notebook: LinkedNotebook) -> FacadeResult<LinkedNotebook> {
        self.call(|reply| Command::UpdateLinkedNotebook { linked_notebook, reply }).await
    }

    pub async fn find_linked_notebook(&self, guid: Guid) -> FacadeResult<Option<LinkedNotebook>> {
        self.call(|reply| Command::FindLinkedNotebook { guid, reply }).await
    }

    pub async fn list_linked_notebooks(&self) -> FacadeResult<Vec<LinkedNotebook>> {
        self.call(|reply| Command::ListLinkedNotebooks { reply }).await
    }

    pub async fn expunge_linked_notebook(&self, guid: Guid) -> FacadeResult<()> {
        self.call(|reply| Command::ExpungeLinkedNotebook { guid, reply }).await
    }

    /// Deletes every tag that has no surviving notes and belongs to a
    /// linked notebook (§4.7 cleanup pass), returning the number removed.
    pub async fn expunge_noteless_tags_from_linked_notebooks(
        &self,
        token: CorrelationToken,
    ) -> FacadeResult<u32> {
        self.call(|reply| Command::ExpungeNotelessTagsFromLinkedNotebooks { token, reply }).await
    }
}

struct Worker {
    engine: LocalStorageEngine,
    notebook_cache: EntityCache<Notebook>,
    tag_cache: EntityCache<Tag>,
    event_tx: broadcast::Sender<Event>,
}

impl Worker {
    async fn run(mut self, mut command_rx: mpsc::Receiver<Command>) {
        while let Some(command) = command_rx.recv().await {
            self.handle(command).await;
        }
        tracing::debug!("storage worker task shutting down: no remaining senders");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::CreateNotebook { notebook, reply } => {
                let result = notebooks::insert(self.engine.pool(), &notebook)
                    .await
                    .map(|_| notebook.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    self.notebook_cache.put(notebook.local_id, notebook.clone());
                    let _ = self.event_tx.send(Event::EntityCreated { kind: FavoritableKind::Notebook, local_id: notebook.local_id });
                }
                let _ = reply.send(result);
            }
            Command::UpdateNotebook { notebook, reply } => {
                let result = notebooks::update(self.engine.pool(), &notebook)
                    .await
                    .map(|_| notebook.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    self.notebook_cache.put(notebook.local_id, notebook.clone());
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Notebook, local_id: notebook.local_id });
                }
                let _ = reply.send(result);
            }
            Command::FindNotebook { local_id, reply } => {
                if let Some(cached) = self.notebook_cache.get(&local_id) {
                    let _ = reply.send(Ok(Some(cached)));
                    return;
                }
                let result = notebooks::find_by_local_id(self.engine.pool(), local_id)
                    .await
                    .map_err(DomainError::from);
                if let Ok(Some(notebook)) = &result {
                    self.notebook_cache.put(local_id, notebook.clone());
                }
                let _ = reply.send(result);
            }
            Command::ListNotebooks { options, reply } => {
                let result = notebooks::list(self.engine.pool(), &options).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ExpungeNotebook { local_id, reply } => {
                let result = notebooks::expunge(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if result.is_ok() {
                    self.notebook_cache.invalidate(&local_id);
                    let _ = self.event_tx.send(Event::EntityExpunged { kind: FavoritableKind::Notebook, local_id });
                }
                let _ = reply.send(result);
            }
            Command::GetNotebookCount { reply } => {
                let result = notebooks::count(self.engine.pool()).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ListAllSharedNotebooks { reply } => {
                let result = shared_notebooks::list_all(self.engine.pool()).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::CreateTag { tag, reply } => {
                let result = tags::insert(self.engine.pool(), &tag)
                    .await
                    .map(|_| tag.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    self.tag_cache.put(tag.local_id, tag.clone());
                    let _ = self.event_tx.send(Event::EntityCreated { kind: FavoritableKind::Tag, local_id: tag.local_id });
                }
                let _ = reply.send(result);
            }
            Command::UpdateTag { tag, reply } => {
                let result = tags::update(self.engine.pool(), &tag)
                    .await
                    .map(|_| tag.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    self.tag_cache.put(tag.local_id, tag.clone());
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Tag, local_id: tag.local_id });
                }
                let _ = reply.send(result);
            }
            Command::FindTag { local_id, reply } => {
                if let Some(cached) = self.tag_cache.get(&local_id) {
                    let _ = reply.send(Ok(Some(cached)));
                    return;
                }
                let result = tags::find_by_local_id(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if let Ok(Some(tag)) = &result {
                    self.tag_cache.put(local_id, tag.clone());
                }
                let _ = reply.send(result);
            }
            Command::ListTags { options, reply } => {
                let result = tags::list(self.engine.pool(), &options).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::DeleteTag { local_id, reply } => {
                let result = tags::mark_deleted(self.engine.pool(), local_id, chrono::Utc::now())
                    .await
                    .map_err(DomainError::from);
                if result.is_ok() {
                    self.tag_cache.invalidate(&local_id);
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Tag, local_id });
                }
                let _ = reply.send(result);
            }
            Command::RestoreTag { local_id, reply } => {
                let result = tags::restore(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if result.is_ok() {
                    self.tag_cache.invalidate(&local_id);
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Tag, local_id });
                }
                let _ = reply.send(result);
            }
            Command::ExpungeTag { local_id, reply } => {
                let result = tags::expunge(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if result.is_ok() {
                    self.tag_cache.invalidate(&local_id);
                    let _ = self.event_tx.send(Event::EntityExpunged { kind: FavoritableKind::Tag, local_id });
                }
                let _ = reply.send(result);
            }
            Command::GetTagCount { reply } => {
                let result = tags::count(self.engine.pool()).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::CreateNote { note, reply } => {
                let result = notes::insert(self.engine.pool(), &note)
                    .await
                    .map(|_| note.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityCreated { kind: FavoritableKind::Note, local_id: note.local_id });
                }
                let _ = reply.send(result);
            }
            Command::UpdateNote { note, reply } => {
                let result = notes::update(self.engine.pool(), &note)
                    .await
                    .map(|_| note.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Note, local_id: note.local_id });
                }
                let _ = reply.send(result);
            }
            Command::FindNote { local_id, reply } => {
                let result = notes::find_by_local_id(self.engine.pool(), local_id)
                    .await
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ListNotes { filter, options, reply } => {
                let result = notes::find(self.engine.pool(), &filter, &options).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::DeleteNote { local_id, reply } => {
                let result = notes::mark_deleted(self.engine.pool(), local_id, chrono::Utc::now())
                    .await
                    .map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Note, local_id });
                }
                let _ = reply.send(result);
            }
            Command::RestoreNote { local_id, reply } => {
                let result = notes::restore(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::Note, local_id });
                }
                let _ = reply.send(result);
            }
            Command::ExpungeNote { local_id, reply } => {
                let result = notes::expunge(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityExpunged { kind: FavoritableKind::Note, local_id });
                }
                let _ = reply.send(result);
            }
            Command::GetNoteCount { filter, reply } => {
                let result = notes::count(self.engine.pool(), &filter).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::MoveNoteToNotebook {
                note_local_id,
                new_notebook_local_id,
                reply,
            } => {
                let result = notes::move_to_notebook(self.engine.pool(), note_local_id, new_notebook_local_id)
                    .await
                    .map_err(DomainError::from);
                if let Ok(previous_notebook_local_id) = result {
                    let _ = self.event_tx.send(Event::NoteMovedToAnotherNotebook {
                        note_local_id,
                        previous_notebook_local_id,
                        new_notebook_local_id,
                    });
                }
                let _ = reply.send(result.map(|_| ()));
            }
            Command::LinkTagWithNote { note_local_id, tag_local_id, reply } => {
                let result = notes::link_tag(self.engine.pool(), note_local_id, tag_local_id)
                    .await
                    .map_err(DomainError::from);
                match result {
                    Ok((previous_tag_local_ids, new_tag_local_ids)) => {
                        let _ = self.event_tx.send(Event::NoteTagListChanged {
                            note_local_id,
                            previous_tag_local_ids,
                            new_tag_local_ids: new_tag_local_ids.clone(),
                        });
                        let _ = reply.send(Ok(new_tag_local_ids));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::UnlinkTagWithNote { note_local_id, tag_local_id, reply } => {
                let result = notes::unlink_tag(self.engine.pool(), note_local_id, tag_local_id)
                    .await
                    .map_err(DomainError::from);
                match result {
                    Ok((previous_tag_local_ids, new_tag_local_ids)) => {
                        let _ = self.event_tx.send(Event::NoteTagListChanged {
                            note_local_id,
                            previous_tag_local_ids,
                            new_tag_local_ids: new_tag_local_ids.clone(),
                        });
                        let _ = reply.send(Ok(new_tag_local_ids));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::CreateResource { resource, reply } => {
                let result = resources::insert(self.engine.pool(), &resource)
                    .await
                    .map(|_| resource.clone())
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::UpdateResource { resource, reply } => {
                let result = resources::update(self.engine.pool(), &resource)
                    .await
                    .map(|_| resource.clone())
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::FindResource { local_id, reply } => {
                let result = resources::find_by_local_id(self.engine.pool(), local_id)
                    .await
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ExpungeResource { local_id, reply } => {
                let result = resources::expunge(self.engine.pool(), local_id).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::CreateSavedSearch { search, reply } => {
                let result = searches::insert(self.engine.pool(), &search)
                    .await
                    .map(|_| search.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityCreated { kind: FavoritableKind::SavedSearch, local_id: search.local_id });
                }
                let _ = reply.send(result);
            }
            Command::UpdateSavedSearch { search, reply } => {
                let result = searches::update(self.engine.pool(), &search)
                    .await
                    .map(|_| search.clone())
                    .map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityUpdated { kind: FavoritableKind::SavedSearch, local_id: search.local_id });
                }
                let _ = reply.send(result);
            }
            Command::FindSavedSearch { local_id, reply } => {
                let result = searches::find_by_local_id(self.engine.pool(), local_id)
                    .await
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ListSavedSearches { options, reply } => {
                let result = searches::list(self.engine.pool(), &options).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ExpungeSavedSearch { local_id, reply } => {
                let result = searches::expunge(self.engine.pool(), local_id).await.map_err(DomainError::from);
                if result.is_ok() {
                    let _ = self.event_tx.send(Event::EntityExpunged { kind: FavoritableKind::SavedSearch, local_id });
                }
                let _ = reply.send(result);
            }
            Command::GetSavedSearchCount { reply } => {
                let result = searches::count(self.engine.pool()).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::CreateUser { user, reply } => {
                let result = users::insert(self.engine.pool(), &user)
                    .await
                    .map(|_| user.clone())
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::UpdateUser { user, reply } => {
                let result = users::update(self.engine.pool(), &user)
                    .await
                    .map(|_| user.clone())
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::FindCurrentUser { reply } => {
                let result = users::find_current(self.engine.pool()).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::CreateLinkedNotebook { linked_notebook, reply } => {
                let result = linked_notebooks::insert(self.engine.pool(), &linked_notebook)
                    .await
                    .map(|_| linked_notebook.clone())
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::UpdateLinkedNotebook { linked_notebook, reply } => {
                let result = linked_notebooks::update(self.engine.pool(), &linked_notebook)
                    .await
                    .map(|_| linked_notebook.clone())
                    .map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::FindLinkedNotebook { guid, reply } => {
                let result = linked_notebooks::find_by_guid(self.engine.pool(), guid).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ListLinkedNotebooks { reply } => {
                let result = linked_notebooks::list(self.engine.pool()).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ExpungeLinkedNotebook { guid, reply } => {
                let result = linked_notebooks::expunge(self.engine.pool(), guid).await.map_err(DomainError::from);
                let _ = reply.send(result);
            }
            Command::ExpungeNotelessTagsFromLinkedNotebooks { token, reply } => {
                let result = self.expunge_noteless_linked_tags().await;
                if result.is_ok() {
                    let _ = self
                        .event_tx
                        .send(Event::ExpungeNotelessTagsFromLinkedNotebooksComplete { token });
                }
                let _ = reply.send(result.map_err(DomainError::from));
            }
        }
    }

    async fn expunge_noteless_linked_tags(&mut self) -> Result<u32, StorageError> {
        let options = ListOptions::new(NameSortColumn::Name);
        let candidates = tags::list(self.engine.pool(), &options).await?;
        let mut removed = 0;
        for tag in candidates {
            if tag.linked_notebook_guid.is_none() {
                continue;
            }
            let note_count = tags::note_count(self.engine.pool(), tag.local_id).await?;
            if note_count == 0 {
                tags::expunge(self.engine.pool(), tag.local_id).await?;
                self.tag_cache.invalidate(&tag.local_id);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kn_domain::filters::SortDirection;

    #[tokio::test]
    async fn create_then_find_notebook_round_trips() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let notebook = Notebook::new("Personal");
        let created = facade.create_notebook(notebook.clone()).await.unwrap();

        let found = facade.find_notebook(created.local_id).await.unwrap();
        assert_eq!(found.unwrap().name, "Personal");
    }

    #[tokio::test]
    async fn move_note_emits_event() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();

        let notebook_a = facade.create_notebook(Notebook::new("A")).await.unwrap();
        let notebook_b = facade.create_notebook(Notebook::new("B")).await.unwrap();
        let note = facade.create_note(Note::new(notebook_a.local_id, "t", "c")).await.unwrap();

        let mut subscriber = facade.subscribe();
        facade.move_note_to_notebook(note.local_id, notebook_b.local_id).await.unwrap();

        let event = subscriber.recv().await.unwrap();
        match event {
            Event::NoteMovedToAnotherNotebook {
                note_local_id,
                previous_notebook_local_id,
                new_notebook_local_id,
            } => {
                assert_eq!(note_local_id, note.local_id);
                assert_eq!(previous_notebook_local_id, notebook_a.local_id);
                assert_eq!(new_notebook_local_id, notebook_b.local_id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_notebooks_returns_created_notebook() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        facade.create_notebook(Notebook::new("Personal")).await.unwrap();

        let options = ListOptions::new(NameSortColumn::Name).with_direction(SortDirection::Ascending);
        let listed = facade.list_notebooks(options).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn link_tag_with_note_emits_tag_list_changed() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();

        let notebook = facade.create_notebook(Notebook::new("Personal")).await.unwrap();
        let note = facade.create_note(Note::new(notebook.local_id, "t", "c")).await.unwrap();
        let tag = facade.create_tag(Tag::new("work")).await.unwrap();

        let mut subscriber = facade.subscribe();
        let new_list = facade.link_tag_with_note(note.local_id, tag.local_id).await.unwrap();
        assert_eq!(new_list, vec![tag.local_id]);

        let event = subscriber.recv().await.unwrap();
        match event {
            Event::NoteTagListChanged { note_local_id, previous_tag_local_ids, new_tag_local_ids } => {
                assert_eq!(note_local_id, note.local_id);
                assert!(previous_tag_local_ids.is_empty());
                assert_eq!(new_tag_local_ids, vec![tag.local_id]);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let new_list = facade.unlink_tag_with_note(note.local_id, tag.local_id).await.unwrap();
        assert!(new_list.is_empty());
    }

    #[tokio::test]
    async fn expunge_tag_invalidates_cache() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let tag = facade.create_tag(Tag::new("todo")).await.unwrap();
        assert!(facade.find_tag(tag.local_id).await.unwrap().is_some());

        facade.expunge_tag(tag.local_id).await.unwrap();
        assert!(facade.find_tag(tag.local_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_tag_then_restore_round_trips() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let tag = facade.create_tag(Tag::new("archive")).await.unwrap();

        facade.delete_tag(tag.local_id).await.unwrap();
        let found = facade.find_tag(tag.local_id).await.unwrap().unwrap();
        assert!(found.is_deleted());

        facade.restore_tag(tag.local_id).await.unwrap();
        let found = facade.find_tag(tag.local_id).await.unwrap().unwrap();
        assert!(!found.is_deleted());
    }

    #[tokio::test]
    async fn counts_reflect_created_entities() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        facade.create_notebook(Notebook::new("A")).await.unwrap();
        facade.create_notebook(Notebook::new("B")).await.unwrap();
        assert_eq!(facade.get_notebook_count().await.unwrap(), 2);

        facade.create_tag(Tag::new("x")).await.unwrap();
        assert_eq!(facade.get_tag_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_all_shared_notebooks_spans_every_notebook() {
        let facade = StorageFacade::connect(&StorageConfig::in_memory()).await.unwrap();
        let mut notebook = Notebook::new("Team");
        notebook.guid = Some(Guid::from_uuid(Uuid::new_v4()));
        notebook.shared_notebooks = vec![SharedNotebook {
            id: 0,
            user_id: None,
            notebook_guid: notebook.guid.unwrap(),
            email: Some("friend@example.com".into()),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            share_key: None,
            username: None,
            privilege: kn_domain::entities::PrivilegeLevel::Normal,
            allow_preview: true,
            recipient_reminder_notify_email: false,
            recipient_reminder_notify_in_app: false,
        }];
        facade.create_notebook(notebook).await.unwrap();

        let all = facade.list_all_shared_notebooks().await.unwrap();
        assert_eq!(all.len(), 1);
    }
}
