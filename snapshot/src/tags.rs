//! Event tag dictionary.
//!
//! The binary event stream identifies records by a numeric tag. This table
//! maps the tags emitted by the platform's userspace to readable names so the
//! capture decoder can render `# <name> ` instead of a bare number.
//!
//! The table is sorted ascending by id (checked by a unit test) and looked up
//! with a binary search.

/// One entry of the tag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTag {
    pub id: u32,
    pub name: &'static str,
}

const fn tag(id: u32, name: &'static str) -> EventTag {
    EventTag { id, name }
}

/// Known event tags, sorted by id.
pub static EVENT_TAGS: &[EventTag] = &[
    tag(42, "answer"),
    tag(314, "pi"),
    tag(1003, "auditd"),
    tag(2718, "e"),
    tag(2719, "configuration_changed"),
    tag(2720, "sync"),
    tag(2721, "cpu"),
    tag(2722, "battery_level"),
    tag(2723, "battery_status"),
    tag(2724, "power_sleep_requested"),
    tag(2725, "power_screen_broadcast_send"),
    tag(2726, "power_screen_broadcast_done"),
    tag(2727, "power_screen_broadcast_stop"),
    tag(2728, "power_screen_state"),
    tag(2729, "power_partial_wake_state"),
    tag(2730, "battery_discharge"),
    tag(2740, "location_controller"),
    tag(2741, "force_gc"),
    tag(2742, "tickle"),
    tag(2744, "free_storage_changed"),
    tag(2745, "low_storage"),
    tag(2746, "free_storage_left"),
    tag(2747, "contacts_aggregation"),
    tag(2748, "cache_file_deleted"),
    tag(2750, "notification_enqueue"),
    tag(2751, "notification_cancel"),
    tag(2752, "notification_cancel_all"),
    tag(2753, "idle_maintenance_window_start"),
    tag(2754, "idle_maintenance_window_finish"),
    tag(2755, "fstrim_start"),
    tag(2756, "fstrim_finish"),
    tag(2802, "watchdog"),
    tag(2803, "watchdog_proc_pss"),
    tag(2804, "watchdog_soft_reset"),
    tag(2805, "watchdog_hard_reset"),
    tag(2806, "watchdog_pss_stats"),
    tag(2807, "watchdog_proc_stats"),
    tag(2808, "watchdog_scheduled_reboot"),
    tag(2809, "watchdog_meminfo"),
    tag(2810, "watchdog_vmstat"),
    tag(2811, "watchdog_requested_reboot"),
    tag(2820, "backup_data_changed"),
    tag(2821, "backup_start"),
    tag(2822, "backup_transport_failure"),
    tag(2823, "backup_agent_failure"),
    tag(2824, "backup_package"),
    tag(2825, "backup_success"),
    tag(2826, "backup_reset"),
    tag(2827, "backup_initialize"),
    tag(2830, "restore_start"),
    tag(2831, "restore_transport_failure"),
    tag(2832, "restore_agent_failure"),
    tag(2833, "restore_package"),
    tag(2834, "restore_success"),
    tag(2840, "full_backup_package"),
    tag(2841, "full_backup_agent_failure"),
    tag(2842, "full_backup_transport_failure"),
    tag(2843, "full_backup_success"),
    tag(2844, "full_restore_package"),
    tag(2850, "backup_transport_lifecycle"),
    tag(3000, "boot_progress_start"),
    tag(3010, "boot_progress_system_run"),
    tag(3020, "boot_progress_preload_start"),
    tag(3030, "boot_progress_preload_end"),
    tag(3040, "boot_progress_ams_ready"),
    tag(3050, "boot_progress_enable_screen"),
    tag(3060, "boot_progress_pms_start"),
    tag(3070, "boot_progress_pms_system_scan_start"),
    tag(3080, "boot_progress_pms_data_scan_start"),
    tag(3090, "boot_progress_pms_scan_end"),
    tag(3100, "boot_progress_pms_ready"),
    tag(3110, "unknown_sources_enabled"),
    tag(3120, "pm_critical_info"),
    tag(4000, "calendar_upgrade_receiver"),
    tag(4100, "contacts_upgrade_receiver"),
    tag(20003, "dvm_lock_sample"),
    tag(27500, "notification_panel_revealed"),
    tag(27501, "notification_panel_hidden"),
    tag(27510, "notification_visibility_changed"),
    tag(27511, "notification_expansion"),
    tag(27520, "notification_clicked"),
    tag(27530, "notification_canceled"),
    tag(27531, "notification_visibility"),
    tag(30001, "am_finish_activity"),
    tag(30002, "am_task_to_front"),
    tag(30003, "am_new_intent"),
    tag(30004, "am_create_task"),
    tag(30005, "am_create_activity"),
    tag(30006, "am_restart_activity"),
    tag(30007, "am_resume_activity"),
    tag(30008, "am_anr"),
    tag(30009, "am_activity_launch_time"),
    tag(30010, "am_proc_bound"),
    tag(30011, "am_proc_died"),
    tag(30012, "am_failed_to_pause"),
    tag(30013, "am_pause_activity"),
    tag(30014, "am_proc_start"),
    tag(30015, "am_proc_bad"),
    tag(30016, "am_proc_good"),
    tag(30017, "am_low_memory"),
    tag(30018, "am_destroy_activity"),
    tag(30019, "am_relaunch_resume_activity"),
    tag(30020, "am_relaunch_activity"),
    tag(30021, "am_on_paused_called"),
    tag(30022, "am_on_resume_called"),
    tag(30023, "am_kill"),
    tag(30024, "am_broadcast_discard_filter"),
    tag(30025, "am_broadcast_discard_app"),
    tag(30030, "am_create_service"),
    tag(30031, "am_destroy_service"),
    tag(30032, "am_process_crashed_too_much"),
    tag(30033, "am_drop_process"),
    tag(30034, "am_service_crashed_too_much"),
    tag(30035, "am_schedule_service_restart"),
    tag(30036, "am_provider_lost_process"),
    tag(30037, "am_process_start_timeout"),
    tag(30039, "am_crash"),
    tag(30040, "am_wtf"),
    tag(30041, "am_switch_user"),
    tag(30042, "am_activity_fully_drawn_time"),
    tag(30043, "am_focused_activity"),
    tag(30044, "am_focused_stack"),
    tag(30045, "am_pre_boot"),
    tag(30046, "am_meminfo"),
    tag(30047, "am_pss"),
    tag(30048, "am_stop_activity"),
    tag(30049, "am_on_stop_called"),
    tag(30050, "am_mem_factor"),
    tag(31000, "wm_no_surface_memory"),
    tag(31001, "wm_task_created"),
    tag(31002, "wm_task_moved"),
    tag(31003, "wm_task_removed"),
    tag(31004, "wm_stack_created"),
    tag(31005, "wm_home_stack_moved"),
    tag(31006, "wm_stack_removed"),
    tag(31007, "boot_progress_enable_screen"),
    tag(32000, "imf_force_reconnect_ime"),
    tag(36000, "sysui_statusbar_touch"),
    tag(36001, "sysui_heads_up_status"),
    tag(36004, "sysui_status_bar_state"),
    tag(36010, "sysui_panelbar_touch"),
    tag(36020, "sysui_notificationpanel_touch"),
    tag(36030, "sysui_quickpanel_touch"),
    tag(36040, "sysui_panelholder_touch"),
    tag(36050, "sysui_searchpanel_touch"),
    tag(40000, "volume_changed"),
    tag(40001, "stream_devices_changed"),
    tag(50000, "menu_item_selected"),
    tag(50001, "menu_opened"),
    tag(50020, "connectivity_state_changed"),
    tag(50021, "wifi_state_changed"),
    tag(50022, "wifi_event_handled"),
    tag(50023, "wifi_supplicant_state_changed"),
    tag(50100, "pdp_bad_dns_address"),
    tag(50101, "pdp_radio_reset_countdown_triggered"),
    tag(50102, "pdp_radio_reset"),
    tag(50103, "pdp_context_reset"),
    tag(50104, "pdp_reregister_network"),
    tag(50105, "pdp_setup_fail"),
    tag(50106, "call_drop"),
    tag(50107, "data_network_registration_fail"),
    tag(50108, "data_network_status_on_radio_off"),
    tag(50109, "pdp_network_drop"),
    tag(50110, "cdma_data_setup_failed"),
    tag(50111, "cdma_data_drop"),
    tag(50112, "gsm_rat_switched"),
    tag(50113, "gsm_data_state_change"),
    tag(50114, "gsm_service_state_change"),
    tag(50115, "cdma_data_state_change"),
    tag(50116, "cdma_service_state_change"),
    tag(50117, "bad_ip_address"),
    tag(50118, "data_stall_recovery_get_data_call_list"),
    tag(50119, "data_stall_recovery_cleanup"),
    tag(50120, "data_stall_recovery_reregister"),
    tag(50121, "data_stall_recovery_radio_restart"),
    tag(50122, "data_stall_recovery_radio_restart_with_prop"),
    tag(50123, "gsm_rat_switched_new"),
    tag(50125, "exp_det_sms_denied_by_user"),
    tag(50128, "exp_det_sms_sent_by_user"),
    tag(51100, "netstats_mobile_sample"),
    tag(51101, "netstats_wifi_sample"),
    tag(51200, "lockdown_vpn_connecting"),
    tag(51201, "lockdown_vpn_connected"),
    tag(51202, "lockdown_vpn_error"),
    tag(51300, "config_install_failed"),
    tag(51400, "ifw_intent_matched"),
    tag(52000, "db_sample"),
    tag(52001, "http_stats"),
    tag(52002, "content_query_sample"),
    tag(52003, "content_update_sample"),
    tag(52004, "binder_sample"),
    tag(60000, "viewroot_draw"),
    tag(60001, "viewroot_layout"),
    tag(60002, "view_build_drawing_cache"),
    tag(60003, "view_use_drawing_cache"),
    tag(60100, "sf_frame_dur"),
    tag(60110, "sf_stop_bootanim"),
    tag(65537, "exp_det_netlink_failure"),
    tag(70000, "screen_toggled"),
    tag(70101, "browser_zoom_level_change"),
    tag(70102, "browser_double_tap_duration"),
    tag(70103, "browser_bookmark_added"),
    tag(70104, "browser_page_loaded"),
    tag(70105, "browser_timeonpage"),
    tag(70150, "browser_snap_center"),
    tag(70151, "exp_det_attempt_to_call_object_getclass"),
    tag(70200, "aggregation"),
    tag(70201, "aggregation_test"),
    tag(70300, "telephony_event"),
    tag(70301, "phone_ui_enter"),
    tag(70302, "phone_ui_exit"),
    tag(70303, "phone_ui_button_click"),
    tag(70304, "phone_ui_ringer_query_elapsed"),
    tag(70305, "phone_ui_multiple_query"),
    tag(70310, "telecom_event"),
    tag(70311, "telecom_service"),
    tag(71001, "qsb_start"),
    tag(71002, "qsb_click"),
    tag(71003, "qsb_search"),
    tag(71004, "qsb_voice_search"),
    tag(71005, "qsb_exit"),
    tag(71006, "qsb_latency"),
    tag(73001, "input_dispatcher_slow_event_processing"),
    tag(73002, "input_dispatcher_stale_event"),
    tag(73100, "looper_slow_lap_time"),
    tag(73200, "choreographer_frame_skip"),
    tag(75000, "sqlite_mem_alarm_current"),
    tag(75001, "sqlite_mem_alarm_max"),
    tag(75002, "sqlite_mem_alarm_alloc_attempt"),
    tag(75003, "sqlite_mem_released"),
    tag(75004, "sqlite_db_corrupt"),
    tag(76001, "tts_speak_success"),
    tag(76002, "tts_speak_failure"),
    tag(76003, "tts_v2_speak_success"),
    tag(76004, "tts_v2_speak_failure"),
    tag(78001, "exp_det_dispatchCommand_overflow"),
    tag(80100, "bionic_event_memcpy_buffer_overflow"),
    tag(80105, "bionic_event_strcat_buffer_overflow"),
    tag(80110, "bionic_event_memmov_buffer_overflow"),
    tag(80115, "bionic_event_strncat_buffer_overflow"),
    tag(80120, "bionic_event_strncpy_buffer_overflow"),
    tag(80125, "bionic_event_memset_buffer_overflow"),
    tag(80130, "bionic_event_strcpy_buffer_overflow"),
    tag(80200, "bionic_event_strcat_integer_overflow"),
    tag(80205, "bionic_event_strncat_integer_overflow"),
    tag(80300, "bionic_event_resolver_old_response"),
    tag(80305, "bionic_event_resolver_wrong_server"),
    tag(80310, "bionic_event_resolver_wrong_query"),
    tag(90100, "exp_det_cert_pin_failure"),
    tag(90200, "lock_screen_type"),
    tag(90201, "exp_det_device_admin_activated_by_user"),
    tag(90202, "exp_det_device_admin_declined_by_user"),
    tag(90300, "install_package_attempt"),
    tag(201001, "system_update"),
    tag(201002, "system_update_user"),
    tag(202001, "vending_reconstruct"),
    tag(202901, "transaction_event"),
    tag(203001, "sync_details"),
    tag(203002, "google_http_request"),
    tag(204001, "gtalkservice"),
    tag(204002, "gtalk_connection"),
    tag(204003, "gtalk_conn_close"),
    tag(204004, "gtalk_heartbeat_reset"),
    tag(204005, "c2dm"),
    tag(205001, "setup_server_timeout"),
    tag(205002, "setup_required_captcha"),
    tag(205003, "setup_io_error"),
    tag(205004, "setup_server_error"),
    tag(205005, "setup_retries_exhausted"),
    tag(205006, "setup_no_data_network"),
    tag(205007, "setup_completed"),
    tag(205008, "gls_account_tried"),
    tag(205009, "gls_account_saved"),
    tag(205010, "gls_authenticate"),
    tag(205011, "google_mail_switch"),
    tag(206001, "snet"),
    tag(206003, "exp_det_snet"),
    tag(1050101, "nitz_information"),
    tag(1230000, "am_create_stack"),
    tag(1230001, "am_remove_stack"),
    tag(1230002, "am_move_task_to_stack"),
    tag(1230003, "am_exchange_task_to_stack"),
    tag(1230004, "am_create_task_to_stack"),
    tag(1230005, "am_focus_stack"),
    tag(1260001, "vs_move_task_to_display"),
    tag(1260002, "vs_create_display"),
    tag(1260003, "vs_remove_display"),
    tag(1261000, "am_start_user"),
    tag(1261001, "am_stop_user"),
    tag(1397638484, "snet_event_log"),
];

/// Resolve a tag id to its name.
#[inline]
pub fn lookup(id: u32) -> Option<&'static str> {
    lookup_counted(id).0
}

/// Resolve a tag id, also reporting how many table probes the search took.
pub fn lookup_counted(id: u32) -> (Option<&'static str>, usize) {
    let mut probes = 0;
    let mut lo = 0usize;
    let mut hi = EVENT_TAGS.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        probes += 1;
        let entry = &EVENT_TAGS[mid];
        if entry.id == id {
            return (Some(entry.name), probes);
        } else if entry.id < id {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    (None, probes)
}
